//! Static exception-flow analysis.
//!
//! Given decoded method bodies, [`ExceptionFlowAnalyzer`] estimates which exception types a
//! declaring type may throw and which it handles. The result feeds the virtual
//! "unhandled exceptions" test case the engine runs once per test container.
//!
//! The thrown set is a best-effort heuristic: it looks one instruction back from each
//! `throw`, and follows at most one local variable. It is not a sound exception-flow
//! verifier.

mod config;
mod exceptions;

pub use config::{AnalyzerConfig, FoldMode};
pub use exceptions::{CoverageVerdict, ExceptionFlowAnalyzer, ExceptionFlowResult};
