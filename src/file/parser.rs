//! Cursor-based reader over the code section of a method body.
//!
//! [`Parser`] keeps a position inside a byte slice and exposes the handful of operations the
//! instruction decoder needs: sequential little-endian reads, seeking and end-of-data checks.

use crate::{
    file::io::{read_le_at, CilIO},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked cursor over raw CIL bytes.
///
/// # Examples
///
/// ```rust
/// use testkitchen::Parser;
///
/// let data = [0x01, 0x02, 0x03, 0x04];
/// let mut parser = Parser::new(&data);
///
/// let value: u16 = parser.read_le()?;
/// assert_eq!(value, 0x0201);
/// assert_eq!(parser.pos(), 2);
/// assert!(parser.has_more_data());
/// # Ok::<(), testkitchen::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the current position to the specified index.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos >= self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Read a type `T` from the current position and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reads() {
        let data = [0x2A, 0x01, 0x00, 0x00, 0x0A];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u8>().unwrap(), 0x2A);
        assert_eq!(parser.read_le::<u32>().unwrap(), 0x0A00_0001);
        assert!(!parser.has_more_data());
        assert!(parser.read_le::<u8>().is_err());
    }

    #[test]
    fn seek_bounds() {
        let data = [0x00, 0x00];
        let mut parser = Parser::new(&data);

        assert!(parser.seek(1).is_ok());
        assert_eq!(parser.pos(), 1);
        assert!(parser.seek(2).is_err());
    }

    #[test]
    fn empty() {
        let parser = Parser::new(&[]);
        assert!(parser.is_empty());
        assert!(!parser.has_more_data());
    }
}
