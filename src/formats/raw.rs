//! Raw adapter: no interpretation at all.
//!
//! The whole file is treated as code mapped at address zero until the user
//! supplies a layout with [`BinaryFile::with_manual_layout`].

use bytes::Bytes;

use super::{BinaryFile, CodeLayout, Container};
use crate::core::machine::{Endianness, MachineType};

pub fn parse(path: impl Into<String>, contents: Bytes) -> BinaryFile {
    let layout = CodeLayout {
        base: 0,
        limit: contents.len() as u64,
        entry: 0,
        virt_addr: 0,
    };
    BinaryFile::new(
        path,
        contents,
        Container::Raw,
        layout,
        MachineType::Unknown,
        Endianness::Little,
    )
}
