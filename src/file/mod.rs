//! Raw byte access for method bodies.
//!
//! - [`io`] - bounds-checked little-endian reads
//! - [`parser`] - a cursor used by the instruction decoder

pub mod io;
pub mod parser;
