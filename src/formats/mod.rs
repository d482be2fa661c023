//! Container adapters and the common `BinaryFile` view.
//!
//! Every supported container (ELF, PE, CIL) is parsed into the same
//! [`BinaryFile`] shape: where the code section sits in the file, where it is
//! mapped in memory, the entry point and the symbol lists. Anything the
//! adapters cannot parse becomes a raw, unconfigured view of the bytes.

pub mod cil;
pub mod elf;
pub mod pe;
pub mod raw;
pub mod sniffer;

use std::fmt;

use bytes::Bytes;
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SectionKind};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::machine::{Endianness, MachineType};
use crate::core::symbol::{ImportSymbol, Symbol};

pub use sniffer::FormatSniffer;

/// Adapter-level parse failures. The sniffer treats all of them as "try the
/// next adapter".
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a {0} file")]
    NotThisFormat(&'static str),

    #[error("malformed {format} file: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },

    #[error("object parse error: {0}")]
    Object(#[from] object::read::Error),

    #[error("invalid code layout: {0}")]
    InvalidLayout(String),
}

pub type Result<T> = std::result::Result<T, FormatError>;

/// ELF-specific details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfDetails {
    pub is_64: bool,
    /// `e_type`-derived kind of object
    pub kind: object::ObjectKind,
}

/// PE-specific details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeDetails {
    pub is_64: bool,
    pub image_base: u64,
}

/// CLI (.NET) details read from the COR20 header and metadata root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CilDetails {
    pub pe: PeDetails,
    pub runtime_major: u16,
    pub runtime_minor: u16,
    pub flags: u32,
    /// Metadata token (or RVA, for native entry points) of the managed entry
    pub entry_point_token: u32,
    /// Version string from the metadata root, e.g. `v4.0.30319`
    pub metadata_version: String,
}

/// The closed set of containers a file can be identified as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    Elf(ElfDetails),
    Pe(PeDetails),
    Cil(CilDetails),
    Raw,
}

impl Container {
    pub fn name(&self) -> &'static str {
        match self {
            Container::Elf(_) => "ELF",
            Container::Pe(_) => "PE",
            Container::Cil(_) => "CIL",
            Container::Raw => "Raw",
        }
    }
}

/// Code section geometry.
///
/// `base`/`limit` are a file range, `virt_addr` is the address `base` is
/// mapped at, and `entry` is an offset from `base`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeLayout {
    pub base: u64,
    pub limit: u64,
    pub entry: u64,
    pub virt_addr: u64,
}

/// Uniform, immutable view of a parsed binary.
#[derive(Debug, Clone)]
pub struct BinaryFile {
    path: String,
    contents: Bytes,
    container: Container,
    layout: CodeLayout,
    machine_type: MachineType,
    endianness: Endianness,
    export_symbols: Vec<Symbol>,
    import_symbols: Vec<ImportSymbol>,
    configured: bool,
}

impl BinaryFile {
    pub(crate) fn new(
        path: impl Into<String>,
        contents: Bytes,
        container: Container,
        layout: CodeLayout,
        machine_type: MachineType,
        endianness: Endianness,
    ) -> Self {
        let configured = !matches!(container, Container::Raw);
        Self {
            path: path.into(),
            contents,
            container,
            layout,
            machine_type,
            endianness,
            export_symbols: Vec::new(),
            import_symbols: Vec::new(),
            configured,
        }
    }

    pub(crate) fn with_symbols(mut self, exports: Vec<Symbol>, imports: Vec<ImportSymbol>) -> Self {
        self.export_symbols = exports;
        self.import_symbols = imports;
        self
    }

    /// Unconfigured raw view of `contents`.
    pub fn raw(path: impl Into<String>, contents: Bytes) -> Self {
        raw::parse(path, contents)
    }

    /// Replace the code geometry with one the user supplied.
    ///
    /// The code section must start inside the file and the entry point must
    /// land on a byte of the file.
    pub fn with_manual_layout(mut self, layout: CodeLayout) -> Result<Self> {
        let len = self.file_size();
        if layout.base > len {
            return Err(FormatError::InvalidLayout(format!(
                "code section start {:#x} is past the end of the file ({:#x})",
                layout.base, len
            )));
        }
        match layout.base.checked_add(layout.entry) {
            Some(entry) if entry < len || (len == 0 && entry == 0) => {}
            _ => {
                return Err(FormatError::InvalidLayout(format!(
                    "entry point {:#x} is outside the file",
                    layout.entry
                )))
            }
        }
        if layout.virt_addr.checked_add(layout.limit).is_none() {
            return Err(FormatError::InvalidLayout(
                "code section overflows the address space".to_string(),
            ));
        }
        debug!(
            path = %self.path,
            base = %format_args!("{:#x}", layout.base),
            virt_addr = %format_args!("{:#x}", layout.virt_addr),
            "Applying manual code layout"
        );
        self.layout = layout;
        self.configured = true;
        Ok(self)
    }

    /// Override the declared machine, e.g. to pick a decoder for a raw blob.
    pub fn with_machine(mut self, machine_type: MachineType, endianness: Endianness) -> Self {
        self.machine_type = machine_type;
        self.endianness = endianness;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn contents(&self) -> &Bytes {
        &self.contents
    }

    pub fn file_size(&self) -> u64 {
        self.contents.len() as u64
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn layout(&self) -> CodeLayout {
        self.layout
    }

    /// File offset of the code section start.
    pub fn code_section_base(&self) -> u64 {
        self.layout.base
    }

    /// Length of the code section.
    pub fn code_section_limit(&self) -> u64 {
        self.layout.limit
    }

    /// Entry point as an offset from the code section start.
    pub fn entry_point(&self) -> u64 {
        self.layout.entry
    }

    /// Virtual address of the code section start.
    pub fn code_virt_addr(&self) -> u64 {
        self.layout.virt_addr
    }

    pub fn entry_virtual_address(&self) -> u64 {
        self.layout.virt_addr.wrapping_add(self.layout.entry)
    }

    pub fn entry_file_offset(&self) -> u64 {
        self.layout.base.wrapping_add(self.layout.entry)
    }

    pub fn machine_type(&self) -> MachineType {
        self.machine_type
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn export_symbols(&self) -> &[Symbol] {
        &self.export_symbols
    }

    pub fn import_symbols(&self) -> &[ImportSymbol] {
        &self.import_symbols
    }

    /// False only for a raw file nobody has configured yet.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Map a virtual address to a file offset through the code section.
    ///
    /// `None` when the result would be negative or overflow.
    pub fn virtual_to_file_offset(&self, address: u64) -> Option<u64> {
        address
            .checked_add(self.layout.base)?
            .checked_sub(self.layout.virt_addr)
    }

    /// Releases adapter-held resources. All parses are in memory, so there is
    /// nothing to release.
    pub fn close(&mut self) {}
}

impl fmt::Display for BinaryFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.configured {
            writeln!(
                f,
                "The file has not been configured. Set up the code section manually before viewing it."
            )?;
        }
        let l = &self.layout;
        writeln!(f, "File Size: {:x}", self.file_size())?;
        writeln!(f, "Code section offset: {:x}", l.base)?;
        writeln!(f, "Code section end offset: {:x}", l.limit)?;
        writeln!(f, "Entry point offset: {:x}", l.base.wrapping_add(l.entry))?;
        writeln!(f, "Code section address: {:x}", l.virt_addr)?;
        writeln!(
            f,
            "Code section end address: {:x}",
            l.limit.wrapping_add(l.virt_addr)
        )?;
        write!(
            f,
            "Entry point address: {:x}",
            l.entry.wrapping_add(l.virt_addr)
        )
    }
}

/// File range and address of the section holding the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CodeWindow {
    pub file_offset: u64,
    pub size: u64,
    pub address: u64,
}

impl CodeWindow {
    fn contains(&self, address: u64) -> bool {
        address >= self.address && address < self.address.saturating_add(self.size)
    }

    /// Combine with the entry address into a layout, dropping an entry that
    /// lies outside the window or the file.
    pub(crate) fn layout(&self, entry: u64, file_size: u64) -> CodeLayout {
        let mut offset = if self.contains(entry) {
            entry - self.address
        } else {
            debug!(
                entry = %format_args!("{:#x}", entry),
                "Entry point outside the code section"
            );
            0
        };
        if self.file_offset.saturating_add(offset) >= file_size {
            warn!(
                entry = %format_args!("{:#x}", entry),
                "Entry point maps past the end of the file"
            );
            offset = 0;
        }
        CodeLayout {
            base: self.file_offset,
            limit: self.size,
            entry: offset,
            virt_addr: self.address,
        }
    }
}

/// Locate the code section: `.text` first, then any code section holding the
/// entry, then any code section, then the segment holding the entry.
///
/// Ranges are checked against `file_size`; a window starting past the end of
/// the file is skipped and one running past it is cut short.
pub(crate) fn find_code_window(obj: &object::File<'_>, file_size: u64) -> Option<CodeWindow> {
    let entry = obj.entry();
    let bounded = |offset: u64, size: u64, address: u64| {
        if offset >= file_size {
            debug!(
                offset = %format_args!("{:#x}", offset),
                "Code range starts past the end of the file"
            );
            return None;
        }
        Some(CodeWindow {
            file_offset: offset,
            size: size.min(file_size - offset),
            address,
        })
    };
    let window = |section: &object::Section<'_, '_>| {
        section
            .file_range()
            .and_then(|(offset, size)| bounded(offset, size, section.address()))
    };

    if let Some(w) = obj.section_by_name(".text").as_ref().and_then(window) {
        return Some(w);
    }

    let code: Vec<CodeWindow> = obj
        .sections()
        .filter(|s| s.kind() == SectionKind::Text)
        .filter_map(|s| window(&s))
        .collect();
    if let Some(w) = code.iter().find(|w| w.contains(entry)) {
        return Some(*w);
    }
    if let Some(w) = code.first() {
        return Some(*w);
    }

    obj.segments().find_map(|seg| {
        let (offset, size) = seg.file_range();
        bounded(offset, size, seg.address()).filter(|w| w.contains(entry))
    })
}

/// Exported and imported symbols in container order.
pub(crate) fn collect_symbols(obj: &object::File<'_>) -> (Vec<Symbol>, Vec<ImportSymbol>) {
    let mut exports: Vec<Symbol> = match obj.exports() {
        Ok(list) => list
            .iter()
            .map(|e| Symbol::new(String::from_utf8_lossy(e.name()), e.address()))
            .collect(),
        Err(e) => {
            debug!(error = %e, "Failed to read exports");
            Vec::new()
        }
    };

    // Executables rarely export anything; fall back to the global functions
    // of the static symbol table.
    if exports.is_empty() {
        exports = obj
            .symbols()
            .filter(|s| s.is_definition() && s.is_global() && s.kind() == object::SymbolKind::Text)
            .filter_map(|s| s.name().ok().map(|n| Symbol::new(n, s.address())))
            .collect();
    }

    let imports = match obj.imports() {
        Ok(list) => list
            .iter()
            .map(|i| {
                ImportSymbol::new(
                    String::from_utf8_lossy(i.name()),
                    String::from_utf8_lossy(i.library()),
                    0,
                )
            })
            .collect(),
        Err(e) => {
            debug!(error = %e, "Failed to read imports");
            Vec::new()
        }
    };

    (exports, imports)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(len: usize) -> BinaryFile {
        BinaryFile::raw("blob.bin", Bytes::from(vec![0u8; len]))
    }

    #[test]
    fn test_raw_defaults() {
        let file = raw(0x100);
        assert_eq!(file.code_section_base(), 0);
        assert_eq!(file.code_section_limit(), 0x100);
        assert_eq!(file.entry_point(), 0);
        assert_eq!(file.code_virt_addr(), 0);
        assert!(!file.is_configured());
        assert_eq!(file.container(), &Container::Raw);
    }

    #[test]
    fn test_manual_layout() {
        let file = raw(0x1000)
            .with_manual_layout(CodeLayout {
                base: 0x80,
                limit: 0x800,
                entry: 0x10,
                virt_addr: 0x1000,
            })
            .unwrap();
        assert!(file.is_configured());
        assert_eq!(file.entry_virtual_address(), 0x1010);
        assert_eq!(file.entry_file_offset(), 0x90);
        assert_eq!(file.virtual_to_file_offset(0x1000), Some(0x80));
        assert_eq!(file.virtual_to_file_offset(0x10), None);
    }

    #[test]
    fn test_manual_layout_rejects_entry_outside_file() {
        let result = raw(0x100).with_manual_layout(CodeLayout {
            base: 0x80,
            limit: 0x10,
            entry: 0x80,
            virt_addr: 0,
        });
        assert!(matches!(result, Err(FormatError::InvalidLayout(_))));

        let result = raw(0x100).with_manual_layout(CodeLayout {
            base: 0x200,
            ..CodeLayout::default()
        });
        assert!(matches!(result, Err(FormatError::InvalidLayout(_))));
    }

    #[test]
    fn test_summary_display() {
        let file = raw(0x40);
        let text = file.to_string();
        assert!(text.starts_with("The file has not been configured"));
        assert!(text.contains("File Size: 40"));

        let file = file
            .with_manual_layout(CodeLayout {
                base: 0x10,
                limit: 0x20,
                entry: 4,
                virt_addr: 0x400000,
            })
            .unwrap();
        let text = file.to_string();
        assert!(!text.contains("not been configured"));
        assert!(text.contains("Entry point offset: 14"));
        assert!(text.contains("Entry point address: 400004"));
    }

    #[test]
    fn test_code_window_layout() {
        let w = CodeWindow {
            file_offset: 0x80,
            size: 0x20,
            address: 0x400080,
        };
        assert_eq!(w.layout(0x400084, 0x200).entry, 4);
        // entry outside the window
        assert_eq!(w.layout(0x500000, 0x200).entry, 0);
        // entry inside the window but past a truncated file
        assert_eq!(w.layout(0x400090, 0x88).entry, 0);
    }
}
