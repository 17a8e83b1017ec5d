//! Exception-handling clauses as stored in a method body's data sections.

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    ///
    /// A typed `catch` clause has no bits set at all; test for it with
    /// [`ExceptionHandler::is_typed`] rather than `contains(EXCEPTION)`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// One raw exception-handling clause (ECMA-335 II.25.4.6).
///
/// ```text
/// try {
///     // try_offset -> try_offset + try_length
/// }
/// catch (ExceptionType) {
///     // handler_offset -> handler_offset + handler_length
/// }
/// ```
///
/// Offsets are relative to the first byte of the method's code, not to the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of method body.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Class token for typed clauses, filter offset for filter clauses, unused otherwise.
    pub class_or_filter: u32,
}

impl ExceptionHandler {
    /// Returns true for a typed `catch` clause.
    #[must_use]
    pub fn is_typed(&self) -> bool {
        self.flags.is_empty()
    }

    /// The token naming the caught type, for typed clauses only.
    #[must_use]
    pub fn class_token(&self) -> Option<Token> {
        if self.is_typed() && self.class_or_filter != 0 {
            Some(Token::new(self.class_or_filter))
        } else {
            None
        }
    }

    /// Exclusive end of the protected range.
    #[must_use]
    pub fn try_end(&self) -> u32 {
        self.try_offset.saturating_add(self.try_length)
    }

    /// Exclusive end of the handler range.
    #[must_use]
    pub fn handler_end(&self) -> u32 {
        self.handler_offset.saturating_add(self.handler_length)
    }
}
