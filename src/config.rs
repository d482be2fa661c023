//! Configuration for the viewer.
//!
//! Centralized configuration for file loading, format sniffing and the
//! disassembly index, with sensible defaults. Every section may be omitted
//! from a JSON document and falls back to its defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LazydisError, Result};

/// Path suffix of the Unity scripting assembly, the one managed assembly the
/// viewer recognizes by convention.
pub const UNITY_MANAGED_ASSEMBLY: &str = "assets/bin/Data/Managed/Assembly-CSharp.dll";

/// Master configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// File loading limits.
    pub io: IoConfig,
    /// Format identification behavior.
    pub sniffer: SnifferConfig,
    /// Disassembly index tuning.
    pub index: IndexConfig,
}

impl ViewerConfig {
    /// Parse a configuration from JSON text and validate it.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| LazydisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading viewer configuration");
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values the index cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.index.batch_size == 0 {
            return Err(LazydisError::Config(
                "index.batch_size must be at least 1".to_string(),
            ));
        }
        if self.index.fetch_timeout_secs == 0 {
            return Err(LazydisError::Config(
                "index.fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// File loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Largest file the viewer will open.
    pub max_file_size: u64,
    /// Memory-map files instead of reading them into the heap.
    pub use_mmap: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_file_size: 256 * 1024 * 1024,
            use_mmap: true,
        }
    }
}

/// Format sniffing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnifferConfig {
    /// Path suffixes that mark a file as a managed (CIL) assembly.
    pub managed_assembly_suffixes: Vec<String>,
    /// Report any PE carrying a CLI header as CIL, regardless of path.
    pub probe_cli_header: bool,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            managed_assembly_suffixes: vec![UNITY_MANAGED_ASSEMBLY.to_string()],
            probe_cli_header: true,
        }
    }
}

impl SnifferConfig {
    /// True when `path` follows one of the managed-assembly conventions.
    pub fn is_managed_assembly_path(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        self.managed_assembly_suffixes
            .iter()
            .any(|suffix| normalized.ends_with(suffix.as_str()))
    }
}

/// Disassembly index configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Instructions decoded per fetch.
    pub batch_size: usize,
    /// Time budget for one off-thread fetch.
    pub fetch_timeout_secs: u64,
    /// Navigation history depth; the oldest entries are dropped beyond it.
    pub max_history: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            fetch_timeout_secs: 10,
            max_history: 256,
        }
    }
}
