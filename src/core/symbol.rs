//! Exported and imported symbols collected by the container adapters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A symbol the container defines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Symbol name as stored in the container
    pub name: String,
    /// Virtual address of the definition
    pub address: u64,
    /// Export ordinal, for containers that number their exports
    pub ordinal: Option<u32>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, address: u64) -> Self {
        Self {
            name: name.into(),
            address,
            ordinal: None,
        }
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:#x}", self.name, self.address)?;
        if let Some(ordinal) = self.ordinal {
            write!(f, " (#{})", ordinal)?;
        }
        Ok(())
    }
}

/// A symbol the container expects another module to provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSymbol {
    /// Imported name; empty for ordinal-only imports
    pub name: String,
    /// Module the symbol comes from; empty when the container does not say
    pub library: String,
    /// Import address table slot or ordinal, when known
    pub address: u64,
}

impl ImportSymbol {
    pub fn new(name: impl Into<String>, library: impl Into<String>, address: u64) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            address,
        }
    }
}

impl fmt::Display for ImportSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.library.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}!{}", self.library, self.name)
        }
    }
}
