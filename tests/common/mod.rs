//! Common test utilities and helpers.
//!
//! Synthetic container images small enough to reason about byte by byte, and
//! a deterministic provider so index behavior can be checked without a real
//! instruction set.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use lazydis::disasm::{code_window, AssemblyProvider, DisassemblerResult};
use lazydis::{DisassemblyItem, MachineType};
use tempfile::NamedTempFile;

/// Creates a temporary file with the given content.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file
}

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

/// Layout of the synthetic ELF64 image.
pub mod elf_layout {
    pub const LOAD_ADDR: u64 = 0x400000;
    pub const TEXT_OFFSET: u64 = 0x80;
    pub const TEXT_ADDR: u64 = LOAD_ADDR + TEXT_OFFSET;
}

/// Minimal x86-64 ELF executable: one PT_LOAD at 0x400000 covering the file,
/// `.text` holding `code` at file offset 0x80, and a section name table.
pub fn build_elf64(code: &[u8], entry_offset: u64) -> Vec<u8> {
    use elf_layout::*;

    const SHSTRTAB: &[u8] = b"\0.text\0.shstrtab\0";
    let text_off = TEXT_OFFSET as usize;
    let strtab_off = text_off + code.len();
    let sh_off = (strtab_off + SHSTRTAB.len() + 7) & !7;
    let total = sh_off + 3 * 64;
    let mut buf = vec![0u8; total];

    // identification
    buf[0..4].copy_from_slice(b"\x7fELF");
    buf[4] = 2; // ELFCLASS64
    buf[5] = 1; // little endian
    buf[6] = 1; // EV_CURRENT

    put_u16(&mut buf, 16, 2); // ET_EXEC
    put_u16(&mut buf, 18, 0x3e); // EM_X86_64
    put_u32(&mut buf, 20, 1);
    put_u64(&mut buf, 24, TEXT_ADDR + entry_offset);
    put_u64(&mut buf, 32, 64); // e_phoff
    put_u64(&mut buf, 40, sh_off as u64);
    put_u16(&mut buf, 52, 64); // e_ehsize
    put_u16(&mut buf, 54, 56); // e_phentsize
    put_u16(&mut buf, 56, 1); // e_phnum
    put_u16(&mut buf, 58, 64); // e_shentsize
    put_u16(&mut buf, 60, 3); // e_shnum
    put_u16(&mut buf, 62, 2); // e_shstrndx

    // PT_LOAD, R+X, whole file
    let ph = 64;
    put_u32(&mut buf, ph, 1);
    put_u32(&mut buf, ph + 4, 5);
    put_u64(&mut buf, ph + 8, 0);
    put_u64(&mut buf, ph + 16, LOAD_ADDR);
    put_u64(&mut buf, ph + 24, LOAD_ADDR);
    put_u64(&mut buf, ph + 32, total as u64);
    put_u64(&mut buf, ph + 40, total as u64);
    put_u64(&mut buf, ph + 48, 0x1000);

    buf[text_off..text_off + code.len()].copy_from_slice(code);
    buf[strtab_off..strtab_off + SHSTRTAB.len()].copy_from_slice(SHSTRTAB);

    // [1] .text
    let sh = sh_off + 64;
    put_u32(&mut buf, sh, 1);
    put_u32(&mut buf, sh + 4, 1); // SHT_PROGBITS
    put_u64(&mut buf, sh + 8, 0x6); // SHF_ALLOC | SHF_EXECINSTR
    put_u64(&mut buf, sh + 16, TEXT_ADDR);
    put_u64(&mut buf, sh + 24, TEXT_OFFSET);
    put_u64(&mut buf, sh + 32, code.len() as u64);
    put_u64(&mut buf, sh + 48, 16);

    // [2] .shstrtab
    let sh = sh_off + 128;
    put_u32(&mut buf, sh, 7);
    put_u32(&mut buf, sh + 4, 3); // SHT_STRTAB
    put_u64(&mut buf, sh + 24, strtab_off as u64);
    put_u64(&mut buf, sh + 32, SHSTRTAB.len() as u64);
    put_u64(&mut buf, sh + 48, 1);

    buf
}

/// Layout of the synthetic PE32+ image.
pub mod pe_layout {
    pub const IMAGE_BASE: u64 = 0x1_4000_0000;
    pub const TEXT_RVA: u32 = 0x1000;
    pub const TEXT_RAW: u32 = 0x200;
    pub const TEXT_SIZE: u32 = 0x200;
    pub const ENTRY_RVA: u32 = 0x1010;
    pub const COR20_RVA: u32 = 0x1100;
    pub const METADATA_RVA: u32 = 0x1150;
    pub const METADATA_VERSION: &str = "v4.0.30319";
    pub const ENTRY_TOKEN: u32 = 0x0600_0001;
}

/// Minimal x86-64 PE32+ image with a single `.text` section. With `cli` set
/// the image also carries a CLI header and a metadata root inside `.text`.
pub fn build_pe64(code: &[u8], cli: bool) -> Vec<u8> {
    use pe_layout::*;

    let mut buf = vec![0u8; (TEXT_RAW + TEXT_SIZE) as usize];
    buf[0..2].copy_from_slice(b"MZ");
    put_u32(&mut buf, 0x3c, 0x40);
    buf[0x40..0x44].copy_from_slice(b"PE\0\0");

    // COFF header
    let coff = 0x44;
    put_u16(&mut buf, coff, 0x8664);
    put_u16(&mut buf, coff + 2, 1);
    put_u16(&mut buf, coff + 16, 0xF0);
    put_u16(&mut buf, coff + 18, 0x22);

    // optional header
    let opt = coff + 20;
    put_u16(&mut buf, opt, 0x20B);
    put_u32(&mut buf, opt + 4, TEXT_SIZE);
    put_u32(&mut buf, opt + 16, ENTRY_RVA);
    put_u32(&mut buf, opt + 20, TEXT_RVA);
    put_u64(&mut buf, opt + 24, IMAGE_BASE);
    put_u32(&mut buf, opt + 32, 0x1000);
    put_u32(&mut buf, opt + 36, 0x200);
    put_u16(&mut buf, opt + 48, 6);
    put_u32(&mut buf, opt + 56, 0x2000);
    put_u32(&mut buf, opt + 60, TEXT_RAW);
    put_u16(&mut buf, opt + 68, 3);
    put_u32(&mut buf, opt + 108, 16);

    // section table
    let sec = opt + 0xF0;
    buf[sec..sec + 5].copy_from_slice(b".text");
    put_u32(&mut buf, sec + 8, TEXT_SIZE);
    put_u32(&mut buf, sec + 12, TEXT_RVA);
    put_u32(&mut buf, sec + 16, TEXT_SIZE);
    put_u32(&mut buf, sec + 20, TEXT_RAW);
    put_u32(&mut buf, sec + 36, 0x6000_0020);

    let text = TEXT_RAW as usize;
    let len = code.len().min(TEXT_SIZE as usize);
    buf[text..text + len].copy_from_slice(&code[..len]);

    if cli {
        let to_file = |rva: u32| (rva - TEXT_RVA + TEXT_RAW) as usize;
        let dir = opt + 112 + 14 * 8;
        put_u32(&mut buf, dir, COR20_RVA);
        put_u32(&mut buf, dir + 4, 72);

        let cor20 = to_file(COR20_RVA);
        put_u32(&mut buf, cor20, 72);
        put_u16(&mut buf, cor20 + 4, 2);
        put_u16(&mut buf, cor20 + 6, 5);
        put_u32(&mut buf, cor20 + 8, METADATA_RVA);
        put_u32(&mut buf, cor20 + 12, 0x40);
        put_u32(&mut buf, cor20 + 16, 1); // ILONLY
        put_u32(&mut buf, cor20 + 20, ENTRY_TOKEN);

        let root = to_file(METADATA_RVA);
        buf[root..root + 4].copy_from_slice(b"BSJB");
        put_u16(&mut buf, root + 4, 1);
        put_u16(&mut buf, root + 6, 1);
        put_u32(&mut buf, root + 12, 12);
        let version = METADATA_VERSION.as_bytes();
        buf[root + 16..root + 16 + version.len()].copy_from_slice(version);
    }

    buf
}

/// Fixed-width "instructions": every `width` bytes decode to one item whose
/// operand text is its file offset. Counts provider calls.
pub struct ScriptedProvider {
    pub width: usize,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssemblyProvider for ScriptedProvider {
    fn decode_batch(
        &self,
        buffer: &[u8],
        file_offset: u64,
        file_length: u64,
        virtual_base: u64,
        count: usize,
    ) -> DisassemblerResult<Vec<DisassemblyItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let code = code_window(buffer, file_offset, file_length);
        Ok(code
            .chunks(self.width)
            .take(count)
            .enumerate()
            .map(|(i, chunk)| {
                let step = (i * self.width) as u64;
                DisassemblyItem::new(virtual_base + step, chunk.to_vec(), "op")
                    .with_operands(format!("{:#x}", file_offset + step))
            })
            .collect())
    }

    fn machine_type(&self) -> MachineType {
        MachineType::Unknown
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
