//! Test identities and results.

use std::fmt;

use strum::{Display, EnumString};

/// Namespace prefix reserved for synthetic test cases.
pub const VIRTUAL_TESTS: &str = "Virtual Tests";

/// Method segment of an exception-coverage case.
pub const UNHANDLED_EXCEPTIONS: &str = "UnhandledExceptions";

/// Display name used when a repeated case has none.
pub const NO_NAME: &str = "<No Name>";

/// A test to run, as advertised to the host.
///
/// Identity is the qualified name `"{declaring type}.{method}"`. Virtual cases use the
/// [`VIRTUAL_TESTS`] namespace and are never instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestCase {
    /// `"{declaring type}.{method}"`, plus `" #n"` for repetitions
    pub fully_qualified_name: String,
    /// Human readable name
    pub display_name: String,
    /// Full name of the type the test lives on
    pub declaring_type: String,
    /// Method name
    pub method: String,
    /// Where the test was discovered (usually an assembly path)
    pub source: String,
    /// Source file, when known
    pub code_file_path: Option<String>,
    /// 1-based line, when known
    pub line_number: Option<u32>,
}

impl TestCase {
    /// A case bound to a real method.
    #[must_use]
    pub fn standard(declaring_type: &str, method: &str, source: &str) -> Self {
        TestCase {
            fully_qualified_name: format!("{declaring_type}.{method}"),
            display_name: method.replace('_', " "),
            declaring_type: declaring_type.to_string(),
            method: method.to_string(),
            source: source.to_string(),
            code_file_path: None,
            line_number: None,
        }
    }

    /// The synthetic case reporting exception coverage for `declaring_type`.
    #[must_use]
    pub fn exception_coverage(declaring_type: &str, source: &str) -> Self {
        TestCase {
            fully_qualified_name: format!(
                "{VIRTUAL_TESTS}.{declaring_type}.{UNHANDLED_EXCEPTIONS}"
            ),
            display_name: format!("{declaring_type} unhandled exceptions"),
            declaring_type: declaring_type.to_string(),
            method: UNHANDLED_EXCEPTIONS.to_string(),
            source: source.to_string(),
            code_file_path: None,
            line_number: None,
        }
    }

    /// Attach a code location.
    #[must_use]
    pub fn with_location(mut self, file_path: impl Into<String>, line: u32) -> Self {
        self.code_file_path = Some(file_path.into());
        self.line_number = Some(line);
        self
    }

    /// Returns true if the qualified name, minus its last segment, contains [`VIRTUAL_TESTS`].
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.fully_qualified_name
            .rsplit_once('.')
            .is_some_and(|(owner, _)| owner.contains(VIRTUAL_TESTS))
    }

    /// The identity of the `occurrence`-th invocation. The first keeps this identity.
    #[must_use]
    pub fn with_occurrence(&self, occurrence: u32) -> TestCase {
        if occurrence <= 1 {
            return self.clone();
        }

        let display = if self.display_name.is_empty() {
            NO_NAME
        } else {
            self.display_name.as_str()
        };

        TestCase {
            fully_qualified_name: format!("{} #{occurrence}", self.fully_qualified_name),
            display_name: format!("{display} #{occurrence}"),
            ..self.clone()
        }
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified_name)
    }
}

/// Terminal state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TestOutcome {
    /// The body returned true, or the coverage verdict passed
    Passed,
    /// The body returned false, faulted, or the coverage verdict failed
    Failed,
    /// The body called skip
    Skipped,
}

impl TestOutcome {
    /// Map a returned verdict.
    #[must_use]
    pub fn from_verdict(passed: bool) -> Self {
        if passed {
            TestOutcome::Passed
        } else {
            TestOutcome::Failed
        }
    }
}

/// Category of a [`ResultMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MessageCategory {
    /// Why the test was skipped
    Skipped,
    /// Why the test failed
    Failed,
    /// Captured trace output
    StdOut,
}

/// Text attached to a [`TestResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMessage {
    /// Category
    pub category: MessageCategory,
    /// Text
    pub text: String,
}

impl ResultMessage {
    /// Create a message.
    #[must_use]
    pub fn new(category: MessageCategory, text: impl Into<String>) -> Self {
        ResultMessage {
            category,
            text: text.into(),
        }
    }
}

/// The recorded outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// Which invocation this is
    pub case: TestCase,
    /// Outcome
    pub outcome: TestOutcome,
    /// Error text for faulted or failing cases
    pub error_message: Option<String>,
    /// Backtrace or error chain of a fault
    pub error_stack_trace: Option<String>,
    /// Attached messages in the order they were added
    pub messages: Vec<ResultMessage>,
}

impl TestResult {
    /// A result without messages.
    #[must_use]
    pub fn new(case: TestCase, outcome: TestOutcome) -> Self {
        TestResult {
            case,
            outcome,
            error_message: None,
            error_stack_trace: None,
            messages: Vec::new(),
        }
    }

    /// Append a message.
    pub fn add_message(&mut self, category: MessageCategory, text: impl Into<String>) {
        self.messages.push(ResultMessage::new(category, text));
    }

    /// Concatenated text of every [`MessageCategory::StdOut`] message, if any.
    #[must_use]
    pub fn captured_output(&self) -> Option<String> {
        let mut output = self
            .messages
            .iter()
            .filter(|message| message.category == MessageCategory::StdOut)
            .map(|message| message.text.as_str())
            .peekable();
        output.peek()?;
        Some(output.collect())
    }

    /// Text of the first message in `category`.
    #[must_use]
    pub fn message(&self, category: MessageCategory) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.category == category)
            .map(|message| message.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_case() {
        let case = TestCase::standard("Demo.MathTests", "Adds_two_numbers", "Demo.dll");
        assert_eq!(case.fully_qualified_name, "Demo.MathTests.Adds_two_numbers");
        assert_eq!(case.display_name, "Adds two numbers");
        assert!(!case.is_virtual());
    }

    #[test]
    fn coverage_case_is_virtual() {
        let case = TestCase::exception_coverage("Demo.MathTests", "Demo.dll");
        assert_eq!(
            case.fully_qualified_name,
            "Virtual Tests.Demo.MathTests.UnhandledExceptions"
        );
        assert_eq!(case.declaring_type, "Demo.MathTests");
        assert!(case.is_virtual());

        // Only the owner part is considered
        let odd = TestCase::standard("Demo.MathTests", "Virtual Tests", "Demo.dll");
        assert!(!odd.is_virtual());
    }

    #[test]
    fn occurrences() {
        let case = TestCase::standard("Demo.MathTests", "Adds", "Demo.dll");
        assert_eq!(case.with_occurrence(1), case);

        let third = case.with_occurrence(3);
        assert_eq!(third.fully_qualified_name, "Demo.MathTests.Adds #3");
        assert_eq!(third.display_name, "Adds #3");
        assert_eq!(third.source, "Demo.dll");

        let mut unnamed = case.clone();
        unnamed.display_name.clear();
        assert_eq!(unnamed.with_occurrence(2).display_name, "<No Name> #2");
    }

    #[test]
    fn outcome_text() {
        assert_eq!(TestOutcome::Skipped.to_string(), "skipped");
        assert_eq!("failed".parse::<TestOutcome>().unwrap(), TestOutcome::Failed);
        assert_eq!(TestOutcome::from_verdict(true), TestOutcome::Passed);
    }

    #[test]
    fn captured_output_joins_stdout() {
        let case = TestCase::standard("Demo.MathTests", "Adds", "Demo.dll");
        let mut result = TestResult::new(case, TestOutcome::Passed);
        assert_eq!(result.captured_output(), None);

        result.add_message(MessageCategory::Skipped, "ignored");
        result.add_message(MessageCategory::StdOut, "one\n");
        result.add_message(MessageCategory::StdOut, "two\n");
        assert_eq!(result.captured_output().as_deref(), Some("one\ntwo\n"));
        assert_eq!(result.message(MessageCategory::Skipped), Some("ignored"));
    }
}
