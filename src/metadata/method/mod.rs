//! Raw method bodies: header formats and exception-handling clauses.
//!
//! A [`MethodBody`] only describes layout. Turning the code bytes into instructions is the
//! job of [`crate::assembly`].

mod body;
mod exceptions;
mod types;

pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::{MethodBodyFlags, SectionFlags, METHOD_BODY_FORMAT_MASK};
