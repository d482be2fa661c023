use iced_x86::{
    ConditionCode, Decoder, DecoderOptions, FlowControl, Formatter, Instruction, IntelFormatter,
    OpKind,
};

use super::{code_window, AssemblyProvider, DisassemblerError, DisassemblerResult, BAD_MNEMONIC};
use crate::core::item::DisassemblyItem;
use crate::core::machine::MachineType;

pub struct IcedProvider {
    bitness: u32,
    machine: MachineType,
}

impl IcedProvider {
    pub fn new(machine: MachineType) -> DisassemblerResult<Self> {
        let bitness = match machine {
            MachineType::X86 => 32,
            MachineType::X86_64 => 64,
            other => return Err(DisassemblerError::UnsupportedArchitecture(other)),
        };
        Ok(Self { bitness, machine })
    }

    fn branch_target(instr: &Instruction) -> Option<u64> {
        match instr.flow_control() {
            FlowControl::UnconditionalBranch
            | FlowControl::ConditionalBranch
            | FlowControl::Call
            | FlowControl::XbeginXabortXend => match instr.op0_kind() {
                OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                    Some(instr.near_branch_target())
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn condition(instr: &Instruction) -> String {
        match instr.condition_code() {
            ConditionCode::None => String::new(),
            cc => format!("{:?}", cc),
        }
    }
}

impl AssemblyProvider for IcedProvider {
    fn decode_batch(
        &self,
        buffer: &[u8],
        file_offset: u64,
        file_length: u64,
        virtual_base: u64,
        count: usize,
    ) -> DisassemblerResult<Vec<DisassemblyItem>> {
        let code = code_window(buffer, file_offset, file_length);
        let mut decoder = Decoder::with_ip(self.bitness, code, virtual_base, DecoderOptions::NONE);
        let mut formatter = IntelFormatter::new();
        formatter.options_mut().set_space_after_operand_separator(true);
        let mut instr = Instruction::default();
        let mut items = Vec::with_capacity(count.min(code.len()));

        while items.len() < count && decoder.can_decode() {
            let start = decoder.position();
            decoder.decode_out(&mut instr);
            let end = decoder.position();
            if end <= start {
                // no progress: the tail is undecodable
                items.push(DisassemblyItem::new(
                    virtual_base.wrapping_add(start as u64),
                    code[start..].to_vec(),
                    BAD_MNEMONIC,
                ));
                break;
            }
            let bytes = code[start..end].to_vec();

            if instr.is_invalid() {
                items.push(DisassemblyItem::new(instr.ip(), bytes, BAD_MNEMONIC));
                continue;
            }

            let mut mnemonic = String::new();
            formatter.format_mnemonic(&instr, &mut mnemonic);
            let mut operands = String::new();
            formatter.format_all_operands(&instr, &mut operands);

            let mut item = DisassemblyItem::new(instr.ip(), bytes, mnemonic)
                .with_operands(operands)
                .with_condition(Self::condition(&instr));
            if let Some(target) = Self::branch_target(&instr) {
                item = item.with_branch_target(target);
            }
            items.push(item);
        }
        Ok(items)
    }

    fn machine_type(&self) -> MachineType {
        self.machine
    }

    fn name(&self) -> &str {
        "iced-x86"
    }
}
