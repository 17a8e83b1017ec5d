//! Test execution.
//!
//! [`ExecutionEngine`] takes [`TestCase`]s, resolves them through a
//! [`crate::discovery::MethodTable`], and reports every invocation to a [`FrameworkHandle`]:
//! `record_start`, `record_end`, then `record_result`. Leveled diagnostics go to the same
//! handle through [`MessageSink`].
//!
//! A case that calls [`crate::context::TestContext::repeat`] is invoked again, each
//! repetition recorded under the original name suffixed with `#2`, `#3` and so on. Skipping
//! stops further repetitions. Trace output written during an invocation is attached to that
//! invocation's result and to no other.

mod case;
mod config;
mod executor;
mod handle;

pub use case::{
    MessageCategory, ResultMessage, TestCase, TestOutcome, TestResult, NO_NAME,
    UNHANDLED_EXCEPTIONS, VIRTUAL_TESTS,
};
pub use config::EngineConfig;
pub use executor::{ExecutionEngine, FAULT_MESSAGE};
pub use handle::{
    CollectingHandle, FrameworkHandle, HandleSink, LogMessageSink, MessageLevel, MessageSink,
    RecordedEvent,
};
