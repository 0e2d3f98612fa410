//! Abstract view of the host's intermediate representation.
//!
//! Only the shape needed for pattern matching is modelled: an operation kind and
//! tagged operands, grouped into ordered basic blocks.

use serde::{Deserialize, Serialize};

/// Operation performed by an IR instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrOperation {
    /// `var = expr`
    SetVar,
    /// `var.field = expr`
    SetVarField,
    Compare,
    Call,
    Other,
}

impl IrOperation {
    /// Whether the instruction stores a value into a variable or one of its fields.
    pub fn is_assignment(self) -> bool {
        matches!(self, IrOperation::SetVar | IrOperation::SetVarField)
    }
}

/// Tag for an operand. Constant pointers are reported by hosts as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    Variable,
    Constant,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrOperand {
    pub kind: OperandKind,
    /// Variable name, when `kind` is `Variable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Literal value, when `kind` is `Constant`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
}

impl IrOperand {
    pub fn variable(name: impl Into<String>) -> Self {
        Self { kind: OperandKind::Variable, name: Some(name.into()), value: None }
    }

    pub fn constant(value: u64) -> Self {
        Self { kind: OperandKind::Constant, name: None, value: Some(value) }
    }

    pub fn other() -> Self {
        Self { kind: OperandKind::Other, name: None, value: None }
    }

    pub fn constant_value(&self) -> Option<u64> {
        match self.kind {
            OperandKind::Constant => self.value,
            OperandKind::Variable | OperandKind::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrInstruction {
    /// Function-level instruction index; orders instructions within a block.
    pub index: usize,
    pub address: u64,
    pub operation: IrOperation,
    #[serde(default)]
    pub operands: Vec<IrOperand>,
}

impl IrInstruction {
    pub fn new(index: usize, address: u64, operation: IrOperation, operands: Vec<IrOperand>) -> Self {
        Self { index, address, operation, operands }
    }

    /// First constant-valued operand, in operand order.
    pub fn first_constant(&self) -> Option<u64> {
        self.operands.iter().find_map(IrOperand::constant_value)
    }
}

/// Maximal straight-line run of IR instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrBasicBlock {
    pub start: u64,
    pub instructions: Vec<IrInstruction>,
}

impl IrBasicBlock {
    pub fn new(start: u64, instructions: Vec<IrInstruction>) -> Self {
        Self { start, instructions }
    }

    /// Instructions strictly after `index`, in block order.
    pub fn after(&self, index: usize) -> impl Iterator<Item = &IrInstruction> {
        self.instructions.iter().filter(move |instr| instr.index > index)
    }
}
