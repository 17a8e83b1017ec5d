//! A method body decoded into instructions and exception-handling regions.

use crate::{
    assembly::{decode_stream, Instruction},
    file::parser::Parser,
    metadata::{
        method::{ExceptionHandlerFlags, MethodBody},
        typeref::{TokenResolver, TypeRef},
    },
    Result,
};

/// A protected range with its handler, as seen by the analysis.
///
/// `catch_type` is only present for typed `catch` clauses whose type could be resolved;
/// `finally`, `fault` and `filter` regions, as well as catch clauses naming an unknown type,
/// carry `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandlerRegion {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// First offset of the protected range
    pub try_start: u32,
    /// Exclusive end of the protected range
    pub try_end: u32,
    /// First offset of the handler
    pub handler_start: u32,
    /// Exclusive end of the handler
    pub handler_end: u32,
    /// Declared catch type
    pub catch_type: Option<TypeRef>,
}

impl ExceptionHandlerRegion {
    /// A typed `catch` region.
    #[must_use]
    pub fn catch(try_range: (u32, u32), handler_range: (u32, u32), catch_type: TypeRef) -> Self {
        ExceptionHandlerRegion {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start: try_range.0,
            try_end: try_range.1,
            handler_start: handler_range.0,
            handler_end: handler_range.1,
            catch_type: Some(catch_type),
        }
    }

    /// A `finally` region.
    #[must_use]
    pub fn finally(try_range: (u32, u32), handler_range: (u32, u32)) -> Self {
        ExceptionHandlerRegion {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: try_range.0,
            try_end: try_range.1,
            handler_start: handler_range.0,
            handler_end: handler_range.1,
            catch_type: None,
        }
    }

    /// Returns true if `offset` lies inside the protected range.
    #[must_use]
    pub fn protects(&self, offset: u32) -> bool {
        (self.try_start..self.try_end).contains(&offset)
    }
}

/// Ordered instructions plus exception-handling regions of one method. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    regions: Vec<ExceptionHandlerRegion>,
}

impl InstructionStream {
    /// Build a stream from already decoded parts. Instructions are sorted by offset.
    #[must_use]
    pub fn new(mut instructions: Vec<Instruction>, regions: Vec<ExceptionHandlerRegion>) -> Self {
        instructions.sort_by_key(|instr| instr.offset);
        InstructionStream {
            instructions,
            regions,
        }
    }

    /// Decode a raw method body (header, code and exception sections).
    ///
    /// # Arguments
    ///
    /// * `data` - Bytes starting at the method header
    /// * `resolver` - Resolver for operand and catch-clause tokens
    ///
    /// # Errors
    ///
    /// Returns an error if the header, an instruction or an exception section is malformed.
    pub fn decode(data: &[u8], resolver: &dyn TokenResolver) -> Result<Self> {
        let body = MethodBody::from(data)?;
        let code = data
            .get(body.code_range())
            .ok_or(crate::Error::OutOfBounds)?;

        let mut parser = Parser::new(code);
        let instructions = decode_stream(&mut parser, Some(resolver))?;

        let regions = body
            .exception_handlers
            .iter()
            .map(|clause| ExceptionHandlerRegion {
                flags: clause.flags,
                try_start: clause.try_offset,
                try_end: clause.try_end(),
                handler_start: clause.handler_offset,
                handler_end: clause.handler_end(),
                catch_type: clause
                    .class_token()
                    .and_then(|token| resolver.resolve_type(token)),
            })
            .collect();

        Ok(InstructionStream {
            instructions,
            regions,
        })
    }

    /// Instructions, ordered by offset.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Exception-handling regions in declaration order.
    #[must_use]
    pub fn regions(&self) -> &[ExceptionHandlerRegion] {
        &self.regions
    }

    /// Returns true if there are no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// The instruction immediately preceding the one at `index`.
    #[must_use]
    pub fn previous(&self, index: usize) -> Option<&Instruction> {
        index.checked_sub(1).and_then(|i| self.instructions.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::InstructionKind,
        metadata::{
            token::Token,
            typeref::{MemberRef, TokenTable},
        },
    };

    #[rustfmt::skip]
    const GUARDED_THROW: [u8; 44] = [
        0x1B, 0x30, 0x02, 0x00,
        0x0D, 0x00, 0x00, 0x00,
        0x01, 0x00, 0x00, 0x11,
        0x73, 0x01, 0x00, 0x00, 0x0A,   // newobj ArgumentException::.ctor
        0x7A,                           // throw
        0x26,                           // pop
        0x17,                           // ldc.i4.1
        0x0A,                           // stloc.0
        0xDE, 0x00,                     // leave.s
        0x06,                           // ldloc.0
        0x2A,                           // ret
        0x00, 0x00, 0x00,
        0x01, 0x10, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x06, 0x06, 0x00, 0x05, 0x02, 0x00, 0x00, 0x01,
    ];

    fn argument_exception() -> TypeRef {
        TypeRef::new("System.ArgumentException")
            .with_base("System.SystemException")
            .with_base("System.Exception")
    }

    #[test]
    fn decode_body_with_catch() {
        let table = TokenTable::new()
            .with_type(Token::new(0x0100_0002), argument_exception())
            .with_member(
                Token::new(0x0A00_0001),
                MemberRef::constructor(argument_exception()),
            );

        let stream = InstructionStream::decode(&GUARDED_THROW, &table).unwrap();

        assert_eq!(stream.len(), 8);
        assert_eq!(stream.instructions()[1].kind, InstructionKind::Throw);
        assert_eq!(
            stream.previous(1).and_then(Instruction::constructed_type),
            Some(&argument_exception())
        );
        assert!(stream.previous(0).is_none());

        assert_eq!(stream.regions().len(), 1);
        let region = &stream.regions()[0];
        assert_eq!(region.catch_type, Some(argument_exception()));
        assert!(region.protects(5));
        assert!(!region.protects(6));
        assert_eq!(region.handler_end, 11);
    }

    #[test]
    fn unresolved_catch_type_is_untyped() {
        let stream = InstructionStream::decode(&GUARDED_THROW, &TokenTable::new()).unwrap();

        assert_eq!(stream.regions().len(), 1);
        assert_eq!(stream.regions()[0].catch_type, None);
        assert_eq!(stream.instructions()[0].constructed_type(), None);
    }

    #[test]
    fn malformed_body() {
        assert!(InstructionStream::decode(&[0x01], &TokenTable::new()).is_err());
        // Tiny header whose code contains a reserved opcode
        assert!(InstructionStream::decode(&[0x06, 0x24], &TokenTable::new()).is_err());
    }
}
