//! ELF adapter.

use bytes::Bytes;
use object::{FileKind, Object};
use tracing::debug;

use super::{collect_symbols, find_code_window, BinaryFile, Container, ElfDetails, FormatError, Result};
use crate::core::machine::{Endianness, MachineType};

/// Parse an ELF image into a [`BinaryFile`].
///
/// Returns [`FormatError::NotThisFormat`] for anything without an ELF
/// identification, and [`FormatError::Malformed`] when no code can be located.
pub fn parse(path: impl Into<String>, contents: Bytes) -> Result<BinaryFile> {
    let data: &[u8] = &contents;
    let is_64 = match FileKind::parse(data) {
        Ok(FileKind::Elf32) => false,
        Ok(FileKind::Elf64) => true,
        _ => return Err(FormatError::NotThisFormat("ELF")),
    };

    let obj = object::File::parse(data)?;
    let file_size = data.len() as u64;
    let window = find_code_window(&obj, file_size).ok_or_else(|| FormatError::Malformed {
        format: "ELF",
        message: "no code section or executable segment inside the file".to_string(),
    })?;
    let layout = window.layout(obj.entry(), file_size);
    let machine = MachineType::from(obj.architecture());
    let endianness = if obj.is_little_endian() {
        Endianness::Little
    } else {
        Endianness::Big
    };
    let details = ElfDetails {
        is_64,
        kind: obj.kind(),
    };
    let (exports, imports) = collect_symbols(&obj);

    debug!(
        machine = %machine,
        code_base = %format_args!("{:#x}", layout.base),
        code_addr = %format_args!("{:#x}", layout.virt_addr),
        exports = exports.len(),
        imports = imports.len(),
        "Parsed ELF"
    );

    Ok(BinaryFile::new(
        path,
        contents.clone(),
        Container::Elf(details),
        layout,
        machine,
        endianness,
    )
    .with_symbols(exports, imports))
}
