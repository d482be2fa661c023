use super::capstone::CapstoneProvider;
use super::iced::IcedProvider;
use super::{AssemblyProvider, DisassemblerError, DisassemblerResult};
use crate::core::item::DisassemblyItem;
use crate::core::machine::{Endianness, MachineType};

pub enum Backend {
    Iced(IcedProvider),
    Cap(CapstoneProvider),
}

impl AssemblyProvider for Backend {
    fn decode_batch(
        &self,
        buffer: &[u8],
        file_offset: u64,
        file_length: u64,
        virtual_base: u64,
        count: usize,
    ) -> DisassemblerResult<Vec<DisassemblyItem>> {
        match self {
            Backend::Iced(d) => {
                d.decode_batch(buffer, file_offset, file_length, virtual_base, count)
            }
            Backend::Cap(d) => {
                d.decode_batch(buffer, file_offset, file_length, virtual_base, count)
            }
        }
    }

    fn machine_type(&self) -> MachineType {
        match self {
            Backend::Iced(d) => d.machine_type(),
            Backend::Cap(d) => d.machine_type(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Backend::Iced(d) => d.name(),
            Backend::Cap(d) => d.name(),
        }
    }
}

/// Select a decoder backend for the given machine.
pub fn for_machine(machine: MachineType, endianness: Endianness) -> DisassemblerResult<Backend> {
    match machine {
        MachineType::X86 | MachineType::X86_64 => IcedProvider::new(machine).map(Backend::Iced),
        MachineType::Cil | MachineType::Unknown => {
            Err(DisassemblerError::UnsupportedArchitecture(machine))
        }
        _ => CapstoneProvider::new(machine, endianness).map(Backend::Cap),
    }
}

/// Preferred backend kind for explicit selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Iced,
    Capstone,
}

/// Explicit backend selector. Returns an error if the backend cannot support the machine.
pub fn for_machine_with(
    machine: MachineType,
    endianness: Endianness,
    kind: BackendKind,
) -> DisassemblerResult<Backend> {
    match kind {
        BackendKind::Iced => IcedProvider::new(machine).map(Backend::Iced),
        BackendKind::Capstone => CapstoneProvider::new(machine, endianness).map(Backend::Cap),
    }
}
