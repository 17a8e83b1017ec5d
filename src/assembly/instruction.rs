//! Typed CIL instruction model.
//!
//! The decoder classifies each instruction into an [`InstructionKind`]. Only the classes the
//! exception-flow analysis consumes are distinguished (object construction, local loads and
//! stores, throws); everything else is [`InstructionKind::Other`]. Operands referring to
//! metadata are resolved to [`TypeRef`] / [`MemberRef`] when a resolver knows the token.

use std::fmt;

use crate::metadata::{
    token::Token,
    typeref::{MemberRef, TypeRef},
};

/// Types of operands for CIL instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
    /// Switch table operand
    Switch,
}

impl OperandType {
    /// Returns the size in bytes of this operand type, `None` for the variable-size switch table.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 => Some(1),
            OperandType::Int16 | OperandType::UInt16 => Some(2),
            OperandType::Int32
            | OperandType::UInt32
            | OperandType::Float32
            | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::UInt64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// An immediate value embedded in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Signed 16-bit immediate value
    Int16(i16),
    /// Unsigned 16-bit immediate value
    UInt16(u16),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Unsigned 32-bit immediate value
    UInt32(u32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// Unsigned 64-bit immediate value
    UInt64(u64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Branch target, as an offset from the start of the method's code
    Target(u32),
    /// Metadata token that was not resolved
    Token(Token),
    /// Resolved type reference (`castclass`, `box`, `newarr`, ...)
    Type(TypeRef),
    /// Resolved method or field reference (`call`, `newobj`, `ldfld`, ...)
    Member(MemberRef),
    /// Local variable slot
    Local(u16),
    /// Method argument index
    Argument(u16),
    /// Switch table with absolute branch targets
    Switch(Vec<u32>),
}

/// Instruction classes the exception-flow analysis distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    /// `newobj`
    Construct,
    /// Any local load form (`ldloc.0`-`ldloc.3`, `ldloc.s`, `ldloc`), with its slot
    LoadLocal(u16),
    /// Any local store form (`stloc.0`-`stloc.3`, `stloc.s`, `stloc`), with its slot
    StoreLocal(u16),
    /// `throw`
    Throw,
    /// `rethrow`
    Rethrow,
    /// Anything else
    Other,
}

/// A single decoded CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset from the start of the method's code
    pub offset: u32,
    /// Encoded size in bytes, including prefix and operand
    pub size: u32,
    /// `0xFE` for two-byte opcodes, `0` otherwise
    pub prefix: u8,
    /// Opcode byte (second byte for two-byte opcodes)
    pub opcode: u8,
    /// Analysis class
    pub kind: InstructionKind,
    /// Decoded operand
    pub operand: Operand,
}

impl Instruction {
    /// Offset of the instruction that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset.saturating_add(self.size)
    }

    /// The type a construction instruction instantiates, if its constructor was resolved.
    #[must_use]
    pub fn constructed_type(&self) -> Option<&TypeRef> {
        match (&self.kind, &self.operand) {
            (InstructionKind::Construct, Operand::Member(member)) => Some(&member.declaring_type),
            _ => None,
        }
    }

    /// Returns true for `throw` and `rethrow`.
    #[must_use]
    pub fn is_throw(&self) -> bool {
        matches!(self.kind, InstructionKind::Throw | InstructionKind::Rethrow)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: ", self.offset)?;
        if self.prefix != 0 {
            write!(f, "{:02X} ", self.prefix)?;
        }
        write!(f, "{:02X}", self.opcode)?;

        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, " {imm:?}"),
            Operand::Target(target) => write!(f, " IL_{target:04x}"),
            Operand::Token(token) => write!(f, " {token}"),
            Operand::Type(ty) => write!(f, " {ty}"),
            Operand::Member(member) => write!(f, " {member}"),
            Operand::Local(slot) => write!(f, " V_{slot}"),
            Operand::Argument(index) => write!(f, " A_{index}"),
            Operand::Switch(targets) => write!(f, " switch({})", targets.len()),
        }
    }
}
