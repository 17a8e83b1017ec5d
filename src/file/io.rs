//! Bounds-checked little-endian reads for raw method bodies.
//!
//! Method headers, exception-handling sections and instruction operands are all stored in
//! little-endian order (ECMA-335 II.25.4). Every read in this module validates the remaining
//! length first and reports [`crate::Error::OutOfBounds`] instead of panicking, so a truncated
//! body can never crash the analyzer.
//!
//! # Examples
//!
//! ```rust
//! use testkitchen::file::io::{read_le, read_le_at};
//!
//! let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00];
//! assert_eq!(read_le::<u16>(&data)?, 1);
//!
//! let mut offset = 2;
//! let second: u16 = read_le_at(&data, &mut offset)?;
//! let third: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!((second, third, offset), (2, 3, 8));
//! # Ok::<(), testkitchen::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Primitive types that can be decoded from a little-endian byte array.
pub trait CilIO: Sized {
    /// Fixed-size byte array backing this type (e.g. `[u8; 4]` for `u32`).
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
}

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}
