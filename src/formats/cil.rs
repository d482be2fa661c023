//! CIL (.NET managed assembly) adapter.
//!
//! A managed assembly is a PE image whose CLI header (data directory 14)
//! points at a COR20 header and a `BSJB` metadata root. The code geometry is
//! the PE's, the machine type is CIL.

use bytes::Bytes;
use object::{Object, ObjectSection};

use super::pe::PeImage;
use super::{BinaryFile, CilDetails, Container, FormatError, Result};
use crate::core::machine::MachineType;

/// Index of the CLI header in the PE data directories.
const CLI_HEADER_DIRECTORY: usize = 14;
/// COR20 header fields read below.
const COR20_MIN_SIZE: usize = 24;
/// "BSJB"
const METADATA_SIGNATURE: u32 = 0x424A_5342;

fn read_u16_le(data: &[u8], off: usize) -> Option<u16> {
    data.get(off..off.checked_add(2)?)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_le(data: &[u8], off: usize) -> Option<u32> {
    data.get(off..off.checked_add(4)?)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// RVA and size of a data directory, read straight from the optional header.
fn data_directory(data: &[u8], index: usize) -> Option<(u32, u32)> {
    let e_lfanew = read_u32_le(data, 0x3c)? as usize;
    let opt_off = e_lfanew.checked_add(4 + 20)?;
    let (count_off, dirs_off) = match read_u16_le(data, opt_off)? {
        0x10B => (opt_off + 92, opt_off + 96),
        0x20B => (opt_off + 108, opt_off + 112),
        _ => return None,
    };
    if index as u32 >= read_u32_le(data, count_off)? {
        return None;
    }
    let off = dirs_off + index * 8;
    let rva = read_u32_le(data, off)?;
    let size = read_u32_le(data, off + 4)?;
    (rva != 0 && size != 0).then_some((rva, size))
}

fn rva_to_offset(image: &PeImage<'_>, rva: u32) -> Option<usize> {
    let rva = rva as u64;
    image.obj.sections().find_map(|s| {
        let start = s.address().checked_sub(image.details.image_base)?;
        let (offset, size) = s.file_range()?;
        (rva >= start && rva < start.saturating_add(size))
            .then(|| (offset + (rva - start)) as usize)
    })
}

/// Read the CLI details of a parsed PE, `None` when it is a native image.
pub(crate) fn read_cli_details(data: &[u8], image: &PeImage<'_>) -> Option<CilDetails> {
    let (rva, size) = data_directory(data, CLI_HEADER_DIRECTORY)?;
    if (size as usize) < COR20_MIN_SIZE {
        return None;
    }
    let cor20 = rva_to_offset(image, rva)?;
    let runtime_major = read_u16_le(data, cor20 + 4)?;
    let runtime_minor = read_u16_le(data, cor20 + 6)?;
    let metadata_rva = read_u32_le(data, cor20 + 8)?;
    let flags = read_u32_le(data, cor20 + 16)?;
    let entry_point_token = read_u32_le(data, cor20 + 20)?;

    let root = rva_to_offset(image, metadata_rva)?;
    if read_u32_le(data, root)? != METADATA_SIGNATURE {
        return None;
    }
    let version_len = read_u32_le(data, root + 12)? as usize;
    let raw = data.get(root + 16..(root + 16).checked_add(version_len)?)?;
    let raw = match memchr::memchr(0, raw) {
        Some(nul) => &raw[..nul],
        None => raw,
    };

    Some(CilDetails {
        pe: image.details,
        runtime_major,
        runtime_minor,
        flags,
        entry_point_token,
        metadata_version: String::from_utf8_lossy(raw).into_owned(),
    })
}

/// Parse a managed assembly. Fails when the image is not a PE or carries no
/// usable CLI header.
pub fn parse(path: impl Into<String>, contents: Bytes) -> Result<BinaryFile> {
    let data = contents.clone();
    let image = PeImage::parse(&data)?;
    let details = read_cli_details(&data, &image).ok_or_else(|| FormatError::Malformed {
        format: "CIL",
        message: "missing or invalid CLI header".to_string(),
    })?;
    image.into_binary(path, contents, Container::Cil(details), MachineType::Cil)
}
