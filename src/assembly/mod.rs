//! CIL bytecode decoding into a typed instruction model.
//!
//! This is the only part of the crate that knows the binary encoding of method bodies. The
//! analysis in [`crate::analysis`] works purely on [`InstructionStream`].
//!
//! # Key Components
//!
//! - [`decode_instruction`] / [`decode_stream`] - Instruction decoders
//! - [`Instruction`], [`InstructionKind`], [`Operand`] - Decoded instruction model
//! - [`InstructionStream`], [`ExceptionHandlerRegion`] - One decoded method
//! - [`opcodes`] - Opcode constants and operand shapes
//!
//! # Usage Examples
//!
//! ```rust
//! use testkitchen::{assembly::InstructionStream, metadata::typeref::TokenTable};
//!
//! // Tiny header, code: ldc.i4.1, ret
//! let stream = InstructionStream::decode(&[0x0A, 0x17, 0x2A], &TokenTable::new())?;
//! assert_eq!(stream.len(), 2);
//! assert!(stream.regions().is_empty());
//! # Ok::<(), testkitchen::Error>(())
//! ```

mod decoder;
mod instruction;
pub mod opcodes;
mod stream;

pub use decoder::{decode_instruction, decode_stream};
pub use instruction::{Immediate, Instruction, InstructionKind, Operand, OperandType};
pub use stream::{ExceptionHandlerRegion, InstructionStream};
