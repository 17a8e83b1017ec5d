//! Header and section flags of CIL method bodies (ECMA-335 II.25.4.1, II.25.4.5).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags that a method body can have
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header format
        const TINY_FORMAT = 0x2;
        /// Fat method header format
        const FAT_FORMAT = 0x3;
        /// Flag of the fat method header, showing that there are more data sections appended to the header
        const MORE_SECTS = 0x8;
        /// Flag to indicate that this method should call the default constructor on all local variables
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags that a method body section can have
    pub struct SectionFlags: u8 {
        /// Indicates that this section contains exception handling data
        const EHTABLE = 0x1;
        /// Reserved, shall be 0
        const OPT_ILTABLE = 0x2;
        /// Indicates that the data section format is far
        const FAT_FORMAT = 0x40;
        /// Indicates that the data section is followed by another one
        const MORE_SECTS = 0x80;
    }
}

/// Mask selecting the header format bits of the first body byte.
pub const METHOD_BODY_FORMAT_MASK: u8 = 0b0000_0011;
