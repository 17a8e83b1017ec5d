//! Outbound interfaces of the engine: leveled messages and result recording.

use std::sync::Mutex;

use strum::Display;

use crate::{
    engine::{TestCase, TestOutcome, TestResult},
    trace,
};

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum MessageLevel {
    /// Progress information
    Informational,
    /// Something was skipped or could not be resolved
    Warning,
    /// Something failed
    Error,
}

/// Accepts leveled diagnostic messages.
pub trait MessageSink {
    /// Deliver one message.
    fn send_message(&self, level: MessageLevel, message: &str);

    /// Shorthand for [`MessageLevel::Informational`].
    fn info(&self, message: &str) {
        self.send_message(MessageLevel::Informational, message);
    }

    /// Shorthand for [`MessageLevel::Warning`].
    fn warning(&self, message: &str) {
        self.send_message(MessageLevel::Warning, message);
    }

    /// Shorthand for [`MessageLevel::Error`].
    fn error(&self, message: &str) {
        self.send_message(MessageLevel::Error, message);
    }
}

/// The host the engine reports to. The engine only pushes into it and never reads back.
pub trait FrameworkHandle: MessageSink {
    /// An invocation is about to start.
    fn record_start(&self, case: &TestCase);

    /// An invocation finished with `outcome`.
    fn record_end(&self, case: &TestCase, outcome: TestOutcome);

    /// The completed result of one invocation.
    fn record_result(&self, result: TestResult);
}

/// Forwards messages to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMessageSink;

impl MessageSink for LogMessageSink {
    fn send_message(&self, level: MessageLevel, message: &str) {
        match level {
            MessageLevel::Informational => log::info!("{message}"),
            MessageLevel::Warning => log::warn!("{message}"),
            MessageLevel::Error => log::error!("{message}"),
        }
    }
}

/// Presents a [`FrameworkHandle`] as a plain [`MessageSink`], optionally copying every
/// message into the trace buffer so it lands in the captured output of the current result.
#[derive(Clone, Copy)]
pub struct HandleSink<'a> {
    inner: &'a dyn FrameworkHandle,
    mirror_to_trace: bool,
}

impl<'a> HandleSink<'a> {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: &'a dyn FrameworkHandle, mirror_to_trace: bool) -> Self {
        HandleSink {
            inner,
            mirror_to_trace,
        }
    }
}

impl MessageSink for HandleSink<'_> {
    fn send_message(&self, level: MessageLevel, message: &str) {
        self.inner.send_message(level, message);
        if self.mirror_to_trace {
            trace::write_line(format!("{level}: {message}"));
        }
    }
}

/// One protocol event seen by a [`CollectingHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    /// [`FrameworkHandle::record_start`]
    Start(String),
    /// [`FrameworkHandle::record_end`]
    End(String, TestOutcome),
    /// [`FrameworkHandle::record_result`]
    Result(String),
}

/// A handle that keeps everything it receives, and forwards messages to `log`.
///
/// Suitable for embedding the engine in a plain Rust test or tool.
#[derive(Debug, Default)]
pub struct CollectingHandle {
    messages: Mutex<Vec<(MessageLevel, String)>>,
    events: Mutex<Vec<RecordedEvent>>,
    results: Mutex<Vec<TestResult>>,
}

impl CollectingHandle {
    /// Create an empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message received so far.
    #[must_use]
    pub fn messages(&self) -> Vec<(MessageLevel, String)> {
        lock!(self.messages).clone()
    }

    /// Messages at exactly `level`.
    #[must_use]
    pub fn messages_at(&self, level: MessageLevel) -> Vec<String> {
        lock!(self.messages)
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Start / end / result events in the order they arrived.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        lock!(self.events).clone()
    }

    /// Results in the order they were recorded.
    #[must_use]
    pub fn results(&self) -> Vec<TestResult> {
        lock!(self.results).clone()
    }
}

impl MessageSink for CollectingHandle {
    fn send_message(&self, level: MessageLevel, message: &str) {
        LogMessageSink.send_message(level, message);
        lock!(self.messages).push((level, message.to_string()));
    }
}

impl FrameworkHandle for CollectingHandle {
    fn record_start(&self, case: &TestCase) {
        lock!(self.events).push(RecordedEvent::Start(case.fully_qualified_name.clone()));
    }

    fn record_end(&self, case: &TestCase, outcome: TestOutcome) {
        lock!(self.events).push(RecordedEvent::End(
            case.fully_qualified_name.clone(),
            outcome,
        ));
    }

    fn record_result(&self, result: TestResult) {
        lock!(self.events).push(RecordedEvent::Result(
            result.case.fully_qualified_name.clone(),
        ));
        lock!(self.results).push(result);
    }
}
