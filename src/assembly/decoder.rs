//! CIL instruction decoding.
//!
//! [`decode_instruction`] reads one instruction at the parser's position;
//! [`decode_stream`] decodes a whole code range linearly. Offsets are relative to the start of
//! the parser's data, which callers position at the first byte of a method's code.
//!
//! # Usage Examples
//!
//! ```rust
//! use testkitchen::{Parser, assembly::{decode_instruction, decode_stream, InstructionKind}};
//!
//! let mut parser = Parser::new(&[0x2A]); // ret
//! let instr = decode_instruction(&mut parser, None)?;
//! assert_eq!(instr.kind, InstructionKind::Other);
//!
//! let mut parser = Parser::new(&[0x06, 0x7A]); // ldloc.0, throw
//! let instrs = decode_stream(&mut parser, None)?;
//! assert_eq!(instrs[0].kind, InstructionKind::LoadLocal(0));
//! assert_eq!(instrs[1].kind, InstructionKind::Throw);
//! # Ok::<(), testkitchen::Error>(())
//! ```

use crate::{
    assembly::{opcodes, Immediate, Instruction, InstructionKind, Operand, OperandType},
    file::parser::Parser,
    metadata::{token::Token, typeref::TokenResolver},
    Result,
};

/// Decodes a linear sequence of instructions until the parser runs out of data.
///
/// # Arguments
///
/// * `parser` - Parser over the method's code bytes
/// * `resolver` - Optional resolver used to turn type and member tokens into names
///
/// # Errors
///
/// Returns an error if any instruction is reserved or truncated.
pub fn decode_stream(
    parser: &mut Parser,
    resolver: Option<&dyn TokenResolver>,
) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        instructions.push(decode_instruction(parser, resolver)?);
    }

    Ok(instructions)
}

/// Decodes a single CIL instruction from the current parser position.
///
/// The parser is advanced past the instruction and its operand. Branch operands are turned
/// into absolute targets, local-slot operands of `ldloc`/`stloc` forms into
/// [`Operand::Local`], and type or member tokens into resolved references when `resolver`
/// knows them.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for reserved opcodes and
/// [`crate::Error::OutOfBounds`] if the operand is truncated.
pub fn decode_instruction(
    parser: &mut Parser,
    resolver: Option<&dyn TokenResolver>,
) -> Result<Instruction> {
    let offset = parser.pos();
    let first_byte = parser.read_le::<u8>()?;

    let (op_type, prefix, opcode) = if first_byte == opcodes::FE_PREFIX {
        let second_byte = parser.read_le::<u8>()?;
        match opcodes::operand_type_fe(second_byte) {
            Some(op_type) => (op_type, opcodes::FE_PREFIX, second_byte),
            None => return Err(malformed_error!("Invalid opcode: FE {:02X}", second_byte)),
        }
    } else {
        match opcodes::operand_type(first_byte) {
            Some(op_type) => (op_type, 0, first_byte),
            None => return Err(malformed_error!("Invalid opcode: {:02X}", first_byte)),
        }
    };

    let operand = match op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::Int16 => Operand::Immediate(Immediate::Int16(parser.read_le::<i16>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::UInt32 => Operand::Immediate(Immediate::UInt32(parser.read_le::<u32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::UInt64 => Operand::Immediate(Immediate::UInt64(parser.read_le::<u64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => resolve_token(Token::new(parser.read_le::<u32>()?), resolver),
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()?;
            // Every target needs four bytes; reject counts the data cannot hold
            if (case_count as usize).saturating_mul(4) > parser.len() - parser.pos() {
                return Err(crate::Error::OutOfBounds);
            }

            let mut relative = Vec::with_capacity(case_count as usize);
            for _ in 0..case_count {
                relative.push(parser.read_le::<i32>()?);
            }

            let base = parser.pos();
            Operand::Switch(relative.into_iter().map(|r| branch_target(base, r)).collect())
        }
    };

    let end = parser.pos();
    let kind = classify(prefix, opcode, &operand);
    let operand = retarget(prefix, opcode, kind, operand, end);

    #[allow(clippy::cast_possible_truncation)]
    let (offset, size) = (offset as u32, (end - offset) as u32);

    Ok(Instruction {
        offset,
        size,
        prefix,
        opcode,
        kind,
        operand,
    })
}

/// Maps an opcode onto the instruction classes the analysis consumes.
fn classify(prefix: u8, opcode: u8, operand: &Operand) -> InstructionKind {
    if prefix == opcodes::FE_PREFIX {
        return match (opcode, operand) {
            (opcodes::FE_LDLOC, Operand::Immediate(Immediate::UInt16(slot))) => {
                InstructionKind::LoadLocal(*slot)
            }
            (opcodes::FE_STLOC, Operand::Immediate(Immediate::UInt16(slot))) => {
                InstructionKind::StoreLocal(*slot)
            }
            (opcodes::FE_RETHROW, _) => InstructionKind::Rethrow,
            _ => InstructionKind::Other,
        };
    }

    match (opcode, operand) {
        (opcodes::NEWOBJ, _) => InstructionKind::Construct,
        (opcodes::THROW, _) => InstructionKind::Throw,
        (opcodes::LDLOC_0..=opcodes::LDLOC_3, _) => {
            InstructionKind::LoadLocal(u16::from(opcode - opcodes::LDLOC_0))
        }
        (opcodes::STLOC_0..=opcodes::STLOC_3, _) => {
            InstructionKind::StoreLocal(u16::from(opcode - opcodes::STLOC_0))
        }
        (opcodes::LDLOC_S, Operand::Immediate(Immediate::UInt8(slot))) => {
            InstructionKind::LoadLocal(u16::from(*slot))
        }
        (opcodes::STLOC_S, Operand::Immediate(Immediate::UInt8(slot))) => {
            InstructionKind::StoreLocal(u16::from(*slot))
        }
        _ => InstructionKind::Other,
    }
}

/// Rewrites raw immediates into the operand forms callers care about: local slots, argument
/// indices and absolute branch targets.
fn retarget(
    prefix: u8,
    opcode: u8,
    kind: InstructionKind,
    operand: Operand,
    next: usize,
) -> Operand {
    match (kind, operand) {
        (InstructionKind::LoadLocal(slot) | InstructionKind::StoreLocal(slot), _) => {
            Operand::Local(slot)
        }
        // ldloca.s
        (_, Operand::Immediate(Immediate::UInt8(slot))) if prefix == 0 && opcode == 0x12 => {
            Operand::Local(u16::from(slot))
        }
        // ldarg.s, ldarga.s, starg.s
        (_, Operand::Immediate(Immediate::UInt8(index)))
            if prefix == 0 && (0x0E..=0x10).contains(&opcode) =>
        {
            Operand::Argument(u16::from(index))
        }
        // ldarg, ldarga, starg
        (_, Operand::Immediate(Immediate::UInt16(index)))
            if prefix == opcodes::FE_PREFIX && (0x09..=0x0B).contains(&opcode) =>
        {
            Operand::Argument(index)
        }
        // ldloca
        (_, Operand::Immediate(Immediate::UInt16(slot)))
            if prefix == opcodes::FE_PREFIX && opcode == 0x0D =>
        {
            Operand::Local(slot)
        }
        // br.s .. blt.un.s, leave.s
        (_, Operand::Immediate(Immediate::Int8(delta)))
            if prefix == 0 && is_short_branch(opcode) =>
        {
            Operand::Target(branch_target(next, i32::from(delta)))
        }
        // br .. blt.un, leave
        (_, Operand::Immediate(Immediate::Int32(delta)))
            if prefix == 0 && is_long_branch(opcode) =>
        {
            Operand::Target(branch_target(next, delta))
        }
        (_, operand) => operand,
    }
}

fn is_short_branch(opcode: u8) -> bool {
    (opcodes::BR_S..=0x37).contains(&opcode) || opcode == opcodes::LEAVE_S
}

fn is_long_branch(opcode: u8) -> bool {
    (opcodes::BR..=0x44).contains(&opcode) || opcode == opcodes::LEAVE
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn branch_target(next: usize, delta: i32) -> u32 {
    (next as i64).wrapping_add(i64::from(delta)) as u32
}

/// Resolves a type or member token, falling back to the raw token.
fn resolve_token(token: Token, resolver: Option<&dyn TokenResolver>) -> Operand {
    let Some(resolver) = resolver else {
        return Operand::Token(token);
    };

    if token.is_method() {
        if let Some(member) = resolver.resolve_member(token) {
            return Operand::Member(member);
        }
    } else if token.is_type() {
        if let Some(ty) = resolver.resolve_type(token) {
            return Operand::Type(ty);
        }
    }

    Operand::Token(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typeref::{MemberRef, TokenTable, TypeRef};

    #[test]
    fn decode_local_forms() {
        #[rustfmt::skip]
        let code = [
            0x0B,                   // stloc.1
            0x09,                   // ldloc.3
            0x11, 0x07,             // ldloc.s 7
            0x13, 0x05,             // stloc.s 5
            0xFE, 0x0C, 0x00, 0x01, // ldloc 256
            0xFE, 0x0E, 0x02, 0x00, // stloc 2
        ];
        let mut parser = Parser::new(&code);

        let instrs = decode_stream(&mut parser, None).unwrap();

        let kinds: Vec<_> = instrs.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InstructionKind::StoreLocal(1),
                InstructionKind::LoadLocal(3),
                InstructionKind::LoadLocal(7),
                InstructionKind::StoreLocal(5),
                InstructionKind::LoadLocal(256),
                InstructionKind::StoreLocal(2),
            ]
        );
        assert_eq!(instrs[2].operand, Operand::Local(7));
        assert_eq!(instrs[4].offset, 6);
        assert_eq!(instrs[4].size, 4);
        assert_eq!(instrs[4].prefix, 0xFE);
    }

    #[test]
    fn decode_newobj_resolved() {
        let failure = TypeRef::new("Demo.Failure").with_base("System.Exception");
        let table = TokenTable::new().with_member(
            Token::new(0x0A00_0001),
            MemberRef::constructor(failure.clone()),
        );

        // newobj 0x0A000001, throw
        let mut parser = Parser::new(&[0x73, 0x01, 0x00, 0x00, 0x0A, 0x7A]);
        let instrs = decode_stream(&mut parser, Some(&table)).unwrap();

        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0].kind, InstructionKind::Construct);
        assert_eq!(instrs[0].constructed_type(), Some(&failure));
        assert_eq!(instrs[1].kind, InstructionKind::Throw);
        assert_eq!(instrs[1].offset, 5);
    }

    #[test]
    fn decode_newobj_unresolved() {
        let mut parser = Parser::new(&[0x73, 0x01, 0x00, 0x00, 0x0A]);
        let instr = decode_instruction(&mut parser, None).unwrap();

        assert_eq!(instr.operand, Operand::Token(Token::new(0x0A00_0001)));
        assert_eq!(instr.constructed_type(), None);
    }

    #[test]
    fn decode_branches() {
        #[rustfmt::skip]
        let code = [
            0xDE, 0x02,                     // leave.s +2
            0x00,                           // nop
            0x00,                           // nop
            0x38, 0xF8, 0xFF, 0xFF, 0xFF,   // br -8
        ];
        let mut parser = Parser::new(&code);
        let instrs = decode_stream(&mut parser, None).unwrap();

        assert_eq!(instrs[0].operand, Operand::Target(4));
        assert_eq!(instrs[3].operand, Operand::Target(1));
    }

    #[test]
    fn decode_switch() {
        #[rustfmt::skip]
        let code = [
            0x45, 0x02, 0x00, 0x00, 0x00,   // switch (2 targets)
            0x01, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            0x00,                           // nop
            0x00,                           // nop
            0x2A,                           // ret
        ];
        let mut parser = Parser::new(&code);
        let instrs = decode_stream(&mut parser, None).unwrap();

        assert_eq!(instrs[0].size, 13);
        assert_eq!(instrs[0].operand, Operand::Switch(vec![14, 15]));
        assert_eq!(instrs.len(), 4);
    }

    #[test]
    fn decode_rethrow_and_args() {
        let mut parser = Parser::new(&[0xFE, 0x1A, 0x0E, 0x01]);
        let instrs = decode_stream(&mut parser, None).unwrap();

        assert_eq!(instrs[0].kind, InstructionKind::Rethrow);
        assert_eq!(instrs[1].operand, Operand::Argument(1));
    }

    #[test]
    fn decode_invalid() {
        let mut parser = Parser::new(&[0x24]);
        assert!(decode_instruction(&mut parser, None).is_err());

        let mut parser = Parser::new(&[0xFE, 0x08]);
        assert!(decode_instruction(&mut parser, None).is_err());

        // Truncated token operand
        let mut parser = Parser::new(&[0x73, 0x01]);
        assert!(decode_instruction(&mut parser, None).is_err());

        // Switch count larger than the remaining data
        let mut parser = Parser::new(&[0x45, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert!(matches!(
            decode_instruction(&mut parser, None),
            Err(crate::Error::OutOfBounds)
        ));
    }
}
