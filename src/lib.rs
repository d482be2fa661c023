//! lazydis: a lazily disassembling binary viewer core.
//!
//! A file is identified by [`formats::FormatSniffer`] into a [`BinaryFile`],
//! decoded on demand by an [`disasm::AssemblyProvider`] and presented as rows
//! by a [`DisassemblyIndex`].

pub mod config;
pub mod core;
pub mod disasm;
pub mod error;
pub mod formats;
pub mod index;
pub mod io;
pub mod logging;

pub use crate::config::ViewerConfig;
pub use crate::core::item::{Column, ColumnMask, DisassemblyItem};
pub use crate::core::machine::{Endianness, MachineType};
pub use crate::core::symbol::{ImportSymbol, Symbol};
pub use crate::disasm::AssemblyProvider;
pub use crate::error::{LazydisError, Result};
pub use crate::formats::{BinaryFile, CodeLayout, Container, FormatSniffer};
pub use crate::index::{DisassemblyIndex, IndexEvent, SharedIndex};
