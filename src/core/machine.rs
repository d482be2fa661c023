//! Machine types a container can declare.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte order of the code in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => write!(f, "Little"),
            Endianness::Big => write!(f, "Big"),
        }
    }
}

/// Instruction set the code section is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineType {
    /// x86 (32-bit)
    X86,
    /// x86-64 (64-bit)
    X86_64,
    /// ARM (32-bit)
    Arm,
    /// AArch64
    AArch64,
    /// MIPS (32-bit)
    Mips,
    /// MIPS64
    Mips64,
    /// PowerPC (32-bit)
    Ppc,
    /// PowerPC64
    Ppc64,
    /// RISC-V (32-bit)
    RiscV32,
    /// RISC-V (64-bit)
    RiscV64,
    /// .NET Common Intermediate Language
    Cil,
    /// Not declared or not recognized
    Unknown,
}

impl MachineType {
    /// Address size in bits.
    pub fn address_bits(&self) -> u8 {
        match self {
            MachineType::X86
            | MachineType::Arm
            | MachineType::Mips
            | MachineType::Ppc
            | MachineType::RiscV32
            | MachineType::Cil => 32,
            MachineType::X86_64
            | MachineType::AArch64
            | MachineType::Mips64
            | MachineType::Ppc64
            | MachineType::RiscV64
            | MachineType::Unknown => 64,
        }
    }

    pub fn is_64_bit(&self) -> bool {
        self.address_bits() == 64
    }

    /// Byte order the architecture uses when the container does not say.
    pub fn default_endianness(&self) -> Endianness {
        match self {
            MachineType::Ppc | MachineType::Ppc64 => Endianness::Big,
            _ => Endianness::Little,
        }
    }
}

impl From<object::Architecture> for MachineType {
    fn from(arch: object::Architecture) -> Self {
        match arch {
            object::Architecture::I386 => MachineType::X86,
            object::Architecture::X86_64 => MachineType::X86_64,
            object::Architecture::Arm => MachineType::Arm,
            object::Architecture::Aarch64 => MachineType::AArch64,
            object::Architecture::Mips => MachineType::Mips,
            object::Architecture::Mips64 => MachineType::Mips64,
            object::Architecture::PowerPc => MachineType::Ppc,
            object::Architecture::PowerPc64 => MachineType::Ppc64,
            object::Architecture::Riscv32 => MachineType::RiscV32,
            object::Architecture::Riscv64 => MachineType::RiscV64,
            _ => MachineType::Unknown,
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MachineType::X86 => "x86",
            MachineType::X86_64 => "x86_64",
            MachineType::Arm => "arm",
            MachineType::AArch64 => "aarch64",
            MachineType::Mips => "mips",
            MachineType::Mips64 => "mips64",
            MachineType::Ppc => "ppc",
            MachineType::Ppc64 => "ppc64",
            MachineType::RiscV32 => "riscv32",
            MachineType::RiscV64 => "riscv64",
            MachineType::Cil => "cil",
            MachineType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_bits() {
        assert_eq!(MachineType::X86.address_bits(), 32);
        assert_eq!(MachineType::X86_64.address_bits(), 64);
        assert!(MachineType::AArch64.is_64_bit());
        assert!(!MachineType::Cil.is_64_bit());
    }

    #[test]
    fn test_from_object_architecture() {
        assert_eq!(
            MachineType::from(object::Architecture::X86_64),
            MachineType::X86_64
        );
        assert_eq!(
            MachineType::from(object::Architecture::Aarch64),
            MachineType::AArch64
        );
        assert_eq!(
            MachineType::from(object::Architecture::Unknown),
            MachineType::Unknown
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(MachineType::RiscV64.to_string(), "riscv64");
        assert_eq!(Endianness::Big.to_string(), "Big");
        assert_eq!(MachineType::Ppc.default_endianness(), Endianness::Big);
    }
}
