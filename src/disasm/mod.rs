//! Instruction decoders behind the [`AssemblyProvider`] seam.
//!
//! Always-on adapters:
//! - iced-x86 for x86/x64
//! - capstone for ARM/AArch64, MIPS, PPC, RISC-V

pub mod capstone;
pub mod iced;
pub mod registry;

use thiserror::Error;

use crate::core::item::DisassemblyItem;
use crate::core::machine::MachineType;

/// Errors a decoder can report for a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisassemblerError {
    #[error("invalid instruction")]
    InvalidInstruction,
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(MachineType),
    #[error("decoder backend error: {0}")]
    Backend(String),
}

pub type DisassemblerResult<T> = Result<T, DisassemblerError>;

/// Mnemonic used for bytes no instruction could be decoded from.
pub const BAD_MNEMONIC: &str = "(bad)";

/// Decodes batches of instructions out of a file buffer.
///
/// Implementations return items in ascending address order, one per
/// instruction, and may return fewer than `count` near the end of the data.
pub trait AssemblyProvider {
    /// Decode up to `count` instructions starting at `file_offset`, labelling
    /// the first one `virtual_base`. Reading stops at `file_length` or the end
    /// of `buffer`, whichever comes first.
    fn decode_batch(
        &self,
        buffer: &[u8],
        file_offset: u64,
        file_length: u64,
        virtual_base: u64,
        count: usize,
    ) -> DisassemblerResult<Vec<DisassemblyItem>>;

    /// Machine this provider decodes.
    fn machine_type(&self) -> MachineType;

    /// Human-readable decoder name.
    fn name(&self) -> &str {
        "Generic Disassembler"
    }
}

/// The bytes a batch may read: `buffer[file_offset..min(file_length, buffer.len())]`,
/// empty when the offset is past the end.
pub fn code_window(buffer: &[u8], file_offset: u64, file_length: u64) -> &[u8] {
    let end = (file_length.min(buffer.len() as u64)) as usize;
    match usize::try_from(file_offset) {
        Ok(start) if start < end => &buffer[start..end],
        _ => &[],
    }
}
