//! Decoded instruction rows and their flat-line rendering.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// One decoded instruction as the viewer shows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisassemblyItem {
    /// Virtual address of the instruction
    pub address: u64,
    /// Encoded length in bytes
    pub size: u32,
    /// Raw instruction bytes
    pub bytes: Vec<u8>,
    /// Mnemonic text
    pub mnemonic: String,
    /// Condition code, empty for unconditional instructions
    pub condition: String,
    /// Operand text
    pub operands: String,
    /// User comment
    pub comment: String,
    /// Direct branch/call destination
    pub branch_target: Option<u64>,
}

impl DisassemblyItem {
    pub fn new(address: u64, bytes: Vec<u8>, mnemonic: impl Into<String>) -> Self {
        Self {
            address,
            size: bytes.len() as u32,
            bytes,
            mnemonic: mnemonic.into(),
            ..Self::default()
        }
    }

    pub fn with_operands(mut self, operands: impl Into<String>) -> Self {
        self.operands = operands.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_branch_target(mut self, target: u64) -> Self {
        self.branch_target = Some(target);
        self
    }

    /// Empty row handed out when a position has nothing behind it.
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        self.size == 0 && self.mnemonic.is_empty()
    }

    pub fn is_branch(&self) -> bool {
        self.branch_target.is_some()
    }

    /// Address of the instruction that follows this one.
    pub fn next_address(&self) -> u64 {
        self.address.wrapping_add(self.size as u64)
    }

    /// Text of the size column.
    pub fn label(&self) -> String {
        self.size.to_string()
    }

    /// Uppercase hex of the raw bytes, no separators.
    pub fn hex_bytes(&self) -> String {
        hex::encode_upper(&self.bytes)
    }

    /// `mnemonic operands`
    pub fn simple_string(&self) -> String {
        format!("{} {}", self.mnemonic, self.operands)
    }

    /// Render the enabled columns into a single line for copying.
    ///
    /// Columns appear in fixed order: `L_<address><size>:` and a tab, bytes,
    /// mnemonic, a space and the operands, then a tab, `;` and the comment.
    /// The condition column has no place in the flat line. The result is
    /// trimmed of surrounding whitespace.
    pub fn to_code_string(&self, mask: &ColumnMask) -> String {
        let mut out = String::new();
        if mask.shows(Column::Address) {
            let _ = write!(out, "L_{:x}", self.address);
        }
        if mask.shows(Column::Size) {
            out.push_str(&self.label());
        }
        if mask.shows(Column::Address) || mask.shows(Column::Size) {
            out.push_str(":\t");
        }
        if mask.shows(Column::Bytes) {
            out.push_str(&self.hex_bytes());
        }
        if mask.shows(Column::Instruction) {
            out.push_str(&self.mnemonic);
        }
        if mask.shows(Column::Operands) {
            out.push(' ');
            out.push_str(&self.operands);
        }
        if mask.shows(Column::Comment) {
            out.push_str("\t;");
            out.push_str(&self.comment);
        }
        out.trim().to_string()
    }

    /// Text of each enabled column, in display order.
    pub fn cells(&self, mask: &ColumnMask) -> Vec<(Column, String)> {
        Column::ALL
            .iter()
            .filter(|c| mask.shows(**c))
            .map(|c| {
                let text = match c {
                    Column::Address => format!("{:x}", self.address),
                    Column::Size => self.label(),
                    Column::Bytes => self.hex_bytes(),
                    Column::Instruction => self.mnemonic.clone(),
                    Column::Condition => self.condition.clone(),
                    Column::Operands => self.operands.clone(),
                    Column::Comment => self.comment.clone(),
                };
                (*c, text)
            })
            .collect()
    }
}

impl fmt::Display for DisassemblyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {} {}", self.address, self.mnemonic, self.operands)
    }
}

/// Columns of the disassembly listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    Address,
    Size,
    Bytes,
    Instruction,
    Condition,
    Operands,
    Comment,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Address,
        Column::Size,
        Column::Bytes,
        Column::Instruction,
        Column::Condition,
        Column::Operands,
        Column::Comment,
    ];

    /// Header text for the column.
    pub fn title(&self) -> &'static str {
        match self {
            Column::Address => "Address",
            Column::Size => "Size",
            Column::Bytes => "Bytes",
            Column::Instruction => "Instruction",
            Column::Condition => "Cond",
            Column::Operands => "Operands",
            Column::Comment => "Comment",
        }
    }

    fn bit(&self) -> usize {
        *self as usize
    }
}

/// Per-column visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMask([bool; 7]);

impl Default for ColumnMask {
    fn default() -> Self {
        Self::all()
    }
}

impl ColumnMask {
    pub fn all() -> Self {
        Self([true; 7])
    }

    pub fn none() -> Self {
        Self([false; 7])
    }

    pub fn shows(&self, column: Column) -> bool {
        self.0[column.bit()]
    }

    pub fn set(&mut self, column: Column, visible: bool) {
        self.0[column.bit()] = visible;
    }

    pub fn with(mut self, column: Column, visible: bool) -> Self {
        self.set(column, visible);
        self
    }

    /// Build a mask showing only the listed columns.
    pub fn only(columns: &[Column]) -> Self {
        columns
            .iter()
            .fold(Self::none(), |mask, c| mask.with(*c, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mov() -> DisassemblyItem {
        DisassemblyItem::new(0x1000, vec![0x89, 0xd8], "mov").with_operands("eax, ebx")
    }

    #[test]
    fn test_code_string_all_columns() {
        let mut item = mov();
        item.comment = "hello".to_string();
        assert_eq!(
            item.to_code_string(&ColumnMask::all()),
            "L_10002:\t89D8mov eax, ebx\t;hello"
        );
    }

    #[test]
    fn test_code_string_comment_column() {
        let mut item = mov();
        item.comment = "hello".to_string();
        let with = ColumnMask::only(&[Column::Instruction, Column::Operands, Column::Comment]);
        assert!(item.to_code_string(&with).contains(";hello"));
        let without = with.with(Column::Comment, false);
        assert!(!item.to_code_string(&without).contains("hello"));
        assert_eq!(item.to_code_string(&without), "mov eax, ebx");
    }

    #[test]
    fn test_code_string_address_only() {
        let item = mov();
        assert_eq!(item.to_code_string(&ColumnMask::only(&[Column::Address])), "L_1000:");
        assert_eq!(item.to_code_string(&ColumnMask::none()), "");
    }

    #[test]
    fn test_code_string_trims_empty_operands() {
        let item = DisassemblyItem::new(0x10, vec![0xc3], "ret");
        let mask = ColumnMask::only(&[Column::Instruction, Column::Operands, Column::Comment]);
        assert_eq!(item.to_code_string(&mask), "ret \t;");
        let mask = ColumnMask::only(&[Column::Instruction, Column::Operands]);
        assert_eq!(item.to_code_string(&mask), "ret");
    }

    #[test]
    fn test_cells_follow_mask() {
        let item = mov().with_condition("ne");
        let cells = item.cells(&ColumnMask::only(&[Column::Condition, Column::Address]));
        assert_eq!(
            cells,
            vec![
                (Column::Address, "1000".to_string()),
                (Column::Condition, "ne".to_string())
            ]
        );
    }

    #[test]
    fn test_placeholder_and_branch() {
        assert!(DisassemblyItem::placeholder().is_placeholder());
        let jmp = DisassemblyItem::new(0x20, vec![0xeb, 0x10], "jmp").with_branch_target(0x32);
        assert!(jmp.is_branch());
        assert_eq!(jmp.next_address(), 0x22);
        assert!(!jmp.is_placeholder());
    }
}
