use capstone::{Arch, Capstone, Endian, Mode, NO_EXTRA_MODE};

use super::{code_window, AssemblyProvider, DisassemblerError, DisassemblerResult, BAD_MNEMONIC};
use crate::core::item::DisassemblyItem;
use crate::core::machine::{Endianness, MachineType};

// capstone's generic instruction group ids
const GROUP_JUMP: u8 = 1;
const GROUP_CALL: u8 = 2;

/// Capstone-backed decoder for the non-x86 machines.
///
/// The capstone handle is built per batch so the provider itself stays
/// `Send + Sync` and can be moved onto a blocking worker.
pub struct CapstoneProvider {
    arch: Arch,
    mode: Mode,
    endian: Option<Endian>,
    machine: MachineType,
}

fn cs_arch_mode(machine: MachineType, end: Endianness) -> Option<(Arch, Mode, Option<Endian>)> {
    let endian = Some(match end {
        Endianness::Big => Endian::Big,
        Endianness::Little => Endian::Little,
    });
    match machine {
        MachineType::Arm => Some((Arch::ARM, Mode::Arm, endian)),
        MachineType::AArch64 => Some((Arch::ARM64, Mode::Arm, endian)),
        MachineType::Mips => Some((Arch::MIPS, Mode::Mips32, endian)),
        MachineType::Mips64 => Some((Arch::MIPS, Mode::Mips64, endian)),
        MachineType::Ppc => Some((Arch::PPC, Mode::Mode32, endian)),
        MachineType::Ppc64 => Some((Arch::PPC, Mode::Mode64, endian)),
        MachineType::RiscV32 => Some((Arch::RISCV, Mode::RiscV32, None)),
        MachineType::RiscV64 => Some((Arch::RISCV, Mode::RiscV64, None)),
        MachineType::X86 | MachineType::X86_64 | MachineType::Cil | MachineType::Unknown => None,
    }
}

impl CapstoneProvider {
    pub fn new(machine: MachineType, endianness: Endianness) -> DisassemblerResult<Self> {
        let (arch, mode, endian) = cs_arch_mode(machine, endianness)
            .ok_or(DisassemblerError::UnsupportedArchitecture(machine))?;
        let provider = Self {
            arch,
            mode,
            endian,
            machine,
        };
        // fail early if this capstone build lacks the architecture
        provider.handle()?;
        Ok(provider)
    }

    fn handle(&self) -> DisassemblerResult<Capstone> {
        let mut cs = Capstone::new_raw(self.arch, self.mode, NO_EXTRA_MODE, self.endian)
            .map_err(|e| DisassemblerError::Backend(e.to_string()))?;
        cs.set_detail(true)
            .map_err(|e| DisassemblerError::Backend(e.to_string()))?;
        cs.set_skipdata(true)
            .map_err(|e| DisassemblerError::Backend(e.to_string()))?;
        Ok(cs)
    }

    /// Parse the trailing immediate of a branch operand string
    /// (`#0x1008`, `0x1008`, `-8`, `16`).
    fn parse_immediate(op_str: &str) -> Option<i64> {
        let tok = op_str.rsplit(',').next()?.trim().trim_start_matches('#');
        let (neg, tok) = match tok.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, tok),
        };
        let value = match tok.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16).ok()?,
            None => tok.parse::<i64>().ok()?,
        };
        Some(if neg { -value } else { value })
    }

    fn branch_target(&self, address: u64, op_str: &str) -> Option<u64> {
        let imm = Self::parse_immediate(op_str)?;
        match self.machine {
            // RISC-V prints pc-relative offsets
            MachineType::RiscV32 | MachineType::RiscV64 => Some(address.wrapping_add(imm as u64)),
            _ => u64::try_from(imm).ok(),
        }
    }

    fn condition(&self, mnemonic: &str) -> String {
        match self.machine {
            MachineType::AArch64 => mnemonic
                .split_once('.')
                .map(|(_, cc)| cc.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

impl AssemblyProvider for CapstoneProvider {
    fn decode_batch(
        &self,
        buffer: &[u8],
        file_offset: u64,
        file_length: u64,
        virtual_base: u64,
        count: usize,
    ) -> DisassemblerResult<Vec<DisassemblyItem>> {
        let code = code_window(buffer, file_offset, file_length);
        if code.is_empty() || count == 0 {
            return Ok(Vec::new());
        }
        let cs = self.handle()?;
        let insns = cs
            .disasm_count(code, virtual_base, count)
            .map_err(|e| DisassemblerError::Backend(e.to_string()))?;

        let mut items = Vec::with_capacity(insns.len());
        for insn in insns.iter() {
            let mnemonic = insn.mnemonic().unwrap_or("");
            // skipdata emits ".byte" for undecodable bytes
            if mnemonic.is_empty() || mnemonic == ".byte" {
                items.push(DisassemblyItem::new(
                    insn.address(),
                    insn.bytes().to_vec(),
                    BAD_MNEMONIC,
                ));
                continue;
            }
            let op_str = insn.op_str().unwrap_or("");

            let is_flow = cs
                .insn_detail(insn)
                .map(|detail| {
                    detail
                        .groups()
                        .iter()
                        .any(|g| g.0 == GROUP_JUMP || g.0 == GROUP_CALL)
                })
                .unwrap_or(false);

            let mut item = DisassemblyItem::new(insn.address(), insn.bytes().to_vec(), mnemonic)
                .with_operands(op_str)
                .with_condition(self.condition(mnemonic));
            if is_flow {
                if let Some(target) = self.branch_target(insn.address(), op_str) {
                    item = item.with_branch_target(target);
                }
            }
            items.push(item);
        }
        Ok(items)
    }

    fn machine_type(&self) -> MachineType {
        self.machine
    }

    fn name(&self) -> &str {
        "capstone"
    }
}
