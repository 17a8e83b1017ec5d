//! Parsing of CIL method bodies: tiny and fat headers plus exception-handling sections.
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method Header Format

use std::ops::Range;

use crate::{
    file::io::{read_le, read_le_at},
    metadata::method::{
        ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags,
        METHOD_BODY_FORMAT_MASK,
    },
    Error::OutOfBounds,
    Result,
};

/// Size of one clause in a fat exception-handling section.
const FAT_CLAUSE_SIZE: u32 = 24;
/// Size of one clause in a small exception-handling section.
const SMALL_CLAUSE_SIZE: u32 = 12;

/// Describes one method that has been compiled to CIL bytecode.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Size of the method (length of all instructions, not counting the header) in bytes
    pub size_code: usize,
    /// Size of the method header in bytes
    pub size_header: usize,
    /// `MetaData` token for a signature describing the layout of the local variables for the method. 0 == no local variables
    pub local_var_sig_token: u32,
    /// Maximum number of items on the operand stack
    pub max_stack: usize,
    /// Flag, indicating the type of the method header
    pub is_fat: bool,
    /// Flag, indicating to call default constructor on all local variables
    pub is_init_local: bool,
    /// A list of exception handlers this method has
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Parse a method body header and its trailing exception sections.
    ///
    /// `data` must start at the first header byte; it may extend past the end of the body.
    ///
    /// # Errors
    /// Returns an error if the data is empty, out of bounds, or malformed.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        let format = u16::from(first_byte & METHOD_BODY_FORMAT_MASK);

        if format == MethodBodyFlags::TINY_FORMAT.bits() {
            let size_code = (first_byte >> 2) as usize;
            if size_code + 1 > data.len() {
                return Err(OutOfBounds);
            }

            return Ok(MethodBody {
                size_code,
                size_header: 1,
                local_var_sig_token: 0,
                max_stack: 8,
                is_fat: false,
                is_init_local: false,
                exception_handlers: Vec::new(),
            });
        }

        if format != MethodBodyFlags::FAT_FORMAT.bits() {
            return Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            ));
        }

        if data.len() < 12 {
            return Err(OutOfBounds);
        }

        let first_duo = read_le::<u16>(data)?;
        let size_header = usize::from(first_duo >> 12) * 4;
        let size_code = read_le::<u32>(&data[4..])? as usize;
        if size_header < 12 || data.len() < size_code.saturating_add(size_header) {
            return Err(OutOfBounds);
        }

        let flags_header = MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000_1111_1111_1111);
        let exception_handlers = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
            Self::read_sections(data, size_header + size_code)?
        } else {
            Vec::new()
        };

        Ok(MethodBody {
            size_code,
            size_header,
            local_var_sig_token: read_le::<u32>(&data[8..])?,
            max_stack: read_le::<u16>(&data[2..])? as usize,
            is_fat: true,
            is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
            exception_handlers,
        })
    }

    /// Walk the extra data sections following the code (II.25.4.5). Only exception tables
    /// are defined; anything else ends the walk.
    fn read_sections(data: &[u8], code_end: usize) -> Result<Vec<ExceptionHandler>> {
        let mut exception_handlers = Vec::new();
        let mut cursor = (code_end + 3) & !3;

        while data.len() > (cursor + 4) {
            let section_flags = SectionFlags::from_bits_truncate(read_le::<u8>(&data[cursor..])?);
            if !section_flags.contains(SectionFlags::EHTABLE) {
                break;
            }

            if section_flags.contains(SectionFlags::FAT_FORMAT) {
                let section_size = read_le::<u32>(&data[cursor..])? >> 8;
                if section_size < 4 || data.len() < (cursor + section_size as usize) {
                    break;
                }

                cursor += 4;
                for _ in 0..(section_size - 4) / FAT_CLAUSE_SIZE {
                    // Flags occupy 32 bits in the fat layout but only the low 16 are defined
                    #[allow(clippy::cast_possible_truncation)]
                    let flags = read_le_at::<u32>(data, &mut cursor)? as u16;
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(flags),
                        try_offset: read_le_at::<u32>(data, &mut cursor)?,
                        try_length: read_le_at::<u32>(data, &mut cursor)?,
                        handler_offset: read_le_at::<u32>(data, &mut cursor)?,
                        handler_length: read_le_at::<u32>(data, &mut cursor)?,
                        class_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                    });
                }
            } else {
                let section_size = u32::from(read_le::<u8>(&data[cursor + 1..])?);
                if section_size < 4 || data.len() < (cursor + section_size as usize) {
                    break;
                }

                cursor += 4;
                for _ in 0..(section_size - 4) / SMALL_CLAUSE_SIZE {
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                            data,
                            &mut cursor,
                        )?),
                        try_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                        try_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                        handler_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                        handler_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                        class_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                    });
                }
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                break;
            }
        }

        Ok(exception_handlers)
    }

    /// Get the full size of this method
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_code + self.size_header
    }

    /// Byte range of the instructions inside the buffer passed to [`MethodBody::from`].
    #[must_use]
    pub fn code_range(&self) -> Range<usize> {
        self.size_header..self.size()
    }

    /// Returns true if the body declares at least one exception-handling clause.
    #[must_use]
    pub fn has_exception_handlers(&self) -> bool {
        !self.exception_handlers.is_empty()
    }
}
