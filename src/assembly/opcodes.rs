//! CIL opcode byte constants and operand shapes (ECMA-335 Partition III).
//!
//! Only the opcodes the exception-flow analysis classifies carry a named constant. Every
//! other opcode is still decodable: [`operand_type`] knows the operand shape of the whole
//! instruction set, which is all that is needed to step over it.
//!
//! Two-byte opcodes share the [`FE_PREFIX`] first byte; their second byte is stored with an
//! `FE_` prefix (e.g. [`FE_RETHROW`] = `0x1A` for `rethrow`, encoded `0xFE 0x1A`).
#![allow(missing_docs)]

use crate::assembly::OperandType;

// Load/store local shorthand
pub const LDLOC_0: u8 = 0x06;
pub const LDLOC_1: u8 = 0x07;
pub const LDLOC_2: u8 = 0x08;
pub const LDLOC_3: u8 = 0x09;
pub const STLOC_0: u8 = 0x0A;
pub const STLOC_1: u8 = 0x0B;
pub const STLOC_2: u8 = 0x0C;
pub const STLOC_3: u8 = 0x0D;

// Load/store local (short form)
pub const LDLOC_S: u8 = 0x11;
pub const STLOC_S: u8 = 0x13;

pub const NOP: u8 = 0x00;
pub const LDNULL: u8 = 0x14;
pub const LDC_I4_1: u8 = 0x17;
pub const POP: u8 = 0x26;
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;
pub const BR_S: u8 = 0x2B;
pub const BR: u8 = 0x38;
pub const SWITCH: u8 = 0x45;
pub const LDSTR: u8 = 0x72;
pub const NEWOBJ: u8 = 0x73;
pub const THROW: u8 = 0x7A;
pub const ENDFINALLY: u8 = 0xDC;
pub const LEAVE: u8 = 0xDD;
pub const LEAVE_S: u8 = 0xDE;

// Two-byte opcodes (second byte after 0xFE)
pub const FE_PREFIX: u8 = 0xFE;
pub const FE_LDLOC: u8 = 0x0C;
pub const FE_STLOC: u8 = 0x0E;
pub const FE_RETHROW: u8 = 0x1A;

/// Operand shape of a single-byte opcode, `None` for reserved encodings.
#[must_use]
pub fn operand_type(opcode: u8) -> Option<OperandType> {
    let shape = match opcode {
        // nop .. stloc.3
        0x00..=0x0D => OperandType::None,
        // ldarg.s, ldarga.s, starg.s, ldloc.s, ldloca.s, stloc.s
        0x0E..=0x13 => OperandType::UInt8,
        // ldnull, ldc.i4.m1 .. ldc.i4.8
        0x14..=0x1E => OperandType::None,
        0x1F => OperandType::Int8,
        0x20 => OperandType::Int32,
        0x21 => OperandType::Int64,
        0x22 => OperandType::Float32,
        0x23 => OperandType::Float64,
        // dup, pop
        0x25 | 0x26 => OperandType::None,
        // jmp, call, calli
        0x27..=0x29 => OperandType::Token,
        0x2A => OperandType::None,
        // br.s .. blt.un.s
        0x2B..=0x37 => OperandType::Int8,
        // br .. blt.un
        0x38..=0x44 => OperandType::Int32,
        0x45 => OperandType::Switch,
        // ldind.*, stind.*, arithmetic, conv.*
        0x46..=0x6E => OperandType::None,
        // callvirt, cpobj, ldobj, ldstr, newobj, castclass, isinst
        0x6F..=0x75 => OperandType::Token,
        0x76 => OperandType::None,
        0x79 => OperandType::Token,
        0x7A => OperandType::None,
        // ldfld .. stobj
        0x7B..=0x81 => OperandType::Token,
        // conv.ovf.*.un
        0x82..=0x8B => OperandType::None,
        // box, newarr
        0x8C | 0x8D => OperandType::Token,
        0x8E => OperandType::None,
        0x8F => OperandType::Token,
        // ldelem.*, stelem.*
        0x90..=0xA2 => OperandType::None,
        // ldelem, stelem, unbox.any
        0xA3..=0xA5 => OperandType::Token,
        0xB3..=0xBA => OperandType::None,
        // refanyval
        0xC2 => OperandType::Token,
        0xC3 => OperandType::None,
        // mkrefany
        0xC6 => OperandType::Token,
        // ldtoken
        0xD0 => OperandType::Token,
        // conv.*, add.ovf .. sub.ovf.un, endfinally
        0xD1..=0xDC => OperandType::None,
        0xDD => OperandType::Int32,
        0xDE => OperandType::Int8,
        // stind.i, conv.u
        0xDF | 0xE0 => OperandType::None,
        _ => return None,
    };

    Some(shape)
}

/// Operand shape of a two-byte (`0xFE` prefixed) opcode, `None` for reserved encodings.
#[must_use]
pub fn operand_type_fe(opcode: u8) -> Option<OperandType> {
    let shape = match opcode {
        // arglist, ceq, cgt, cgt.un, clt, clt.un
        0x00..=0x05 => OperandType::None,
        // ldftn, ldvirtftn
        0x06 | 0x07 => OperandType::Token,
        // ldarg, ldarga, starg, ldloc, ldloca, stloc
        0x09..=0x0E => OperandType::UInt16,
        // localloc, endfilter
        0x0F | 0x11 => OperandType::None,
        // unaligned.
        0x12 => OperandType::UInt8,
        // volatile., tail.
        0x13 | 0x14 => OperandType::None,
        // initobj, constrained.
        0x15 | 0x16 => OperandType::Token,
        // cpblk, initblk
        0x17 | 0x18 => OperandType::None,
        // no.
        0x19 => OperandType::UInt8,
        // rethrow
        0x1A => OperandType::None,
        // sizeof
        0x1C => OperandType::Token,
        // refanytype, readonly.
        0x1D | 0x1E => OperandType::None,
        _ => return None,
    };

    Some(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_of_analyzed_opcodes() {
        assert_eq!(operand_type(NEWOBJ), Some(OperandType::Token));
        assert_eq!(operand_type(THROW), Some(OperandType::None));
        assert_eq!(operand_type(LDLOC_S), Some(OperandType::UInt8));
        assert_eq!(operand_type(STLOC_2), Some(OperandType::None));
        assert_eq!(operand_type(LEAVE_S), Some(OperandType::Int8));
        assert_eq!(operand_type_fe(FE_LDLOC), Some(OperandType::UInt16));
        assert_eq!(operand_type_fe(FE_RETHROW), Some(OperandType::None));
    }

    #[test]
    fn reserved_encodings() {
        assert_eq!(operand_type(0x24), None);
        assert_eq!(operand_type(0x77), None);
        assert_eq!(operand_type(0xA6), None);
        assert_eq!(operand_type(0xFF), None);
        assert_eq!(operand_type_fe(0x08), None);
        assert_eq!(operand_type_fe(0x1B), None);
        assert_eq!(operand_type_fe(0x40), None);
    }
}
