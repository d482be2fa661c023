//! Error types for the lazydis binary viewer.
//!
//! Structured error enums built with thiserror. Format errors are local to the
//! container adapters and are absorbed by the sniffer; everything else surfaces
//! through [`LazydisError`].

use thiserror::Error;

use crate::disasm::DisassemblerError;
use crate::formats::FormatError;

/// Main error type for lazydis operations.
#[derive(Debug, Error)]
pub enum LazydisError {
    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File exceeds the configured size limit
    #[error("File size of {found} bytes exceeds the maximum allowed size of {limit} bytes")]
    FileTooLarge { limit: u64, found: u64 },

    /// Container parsing errors that escaped an adapter
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Instruction decoder failures
    #[error("Disassembler error: {0}")]
    Disassembler(#[from] DisassemblerError),

    /// Off-thread fetch exceeded its time budget
    #[error("Fetch timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// Invalid configuration values
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A thread panicked while holding the index lock
    #[error("Index lock poisoned")]
    LockPoisoned,

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for lazydis operations
pub type Result<T> = std::result::Result<T, LazydisError>;

impl<T> From<std::sync::PoisonError<T>> for LazydisError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        LazydisError::LockPoisoned
    }
}
