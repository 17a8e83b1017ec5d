//! Metadata needed to read compiled test methods.
//!
//! # Key Components
//!
//! - [`token`] - Metadata table row references used by instruction operands and catch clauses
//! - [`typeref`] - Resolved type and member names plus the [`typeref::TokenResolver`] seam
//! - [`method`] - Method body header parsing and exception-handling clauses

pub mod method;
pub mod token;
pub mod typeref;
