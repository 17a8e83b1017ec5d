//! Metadata tokens: a table id in the high byte and a 1-based row index below it.

use std::fmt;

/// A metadata token referencing a row in one of the assembly's metadata tables.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
///
/// Instruction operands (`newobj`, `throw` producers) and typed `catch` clauses reference
/// types and constructors through tokens; a [`crate::metadata::typeref::TokenResolver`]
/// turns them into names.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// `TypeRef` table
    pub const TABLE_TYPE_REF: u8 = 0x01;
    /// `TypeDef` table
    pub const TABLE_TYPE_DEF: u8 = 0x02;
    /// `MethodDef` table
    pub const TABLE_METHOD_DEF: u8 = 0x06;
    /// `MemberRef` table
    pub const TABLE_MEMBER_REF: u8 = 0x0A;
    /// `TypeSpec` table
    pub const TABLE_TYPE_SPEC: u8 = 0x1B;
    /// `MethodSpec` table
    pub const TABLE_METHOD_SPEC: u8 = 0x2B;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token points into one of the type tables.
    #[must_use]
    pub fn is_type(&self) -> bool {
        matches!(
            self.table(),
            Self::TABLE_TYPE_REF | Self::TABLE_TYPE_DEF | Self::TABLE_TYPE_SPEC
        )
    }

    /// Returns true if the token points at a method definition or reference.
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(
            self.table(),
            Self::TABLE_METHOD_DEF | Self::TABLE_MEMBER_REF | Self::TABLE_METHOD_SPEC
        )
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
