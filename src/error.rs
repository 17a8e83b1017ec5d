use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into two groups. Body decoding errors ([`Error::Malformed`] and
/// [`Error::OutOfBounds`]) are produced while reading raw CIL and are
/// swallowed by the exception-flow analyzer, which degrades to an empty result instead.
/// Engine errors (resolution, construction, scope lifecycle, loading) abandon a single
/// test case; only a failure to build the run scope is surfaced from
/// [`crate::engine::ExecutionEngine::run`].
///
/// # Examples
///
/// ```rust
/// use testkitchen::{Error, metadata::method::MethodBody};
///
/// match MethodBody::from(&[]) {
///     Ok(_) => unreachable!(),
///     Err(Error::Malformed { message, .. }) => println!("Malformed body: {message}"),
///     Err(e) => println!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Body decoding errors
    /// The method body is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing a method body.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    // Resolution errors
    /// A qualified test name did not map to a loaded type.
    #[error("Could not find type '{0}'")]
    TypeNotFound(String),

    /// A type was found but the requested test method was not declared on it.
    #[error("Could not find method '{method}' on type '{type_name}'")]
    MethodNotFound {
        /// Full name of the type that was searched
        type_name: String,
        /// Name of the missing method
        method: String,
    },

    /// A qualified test name could not be split into type and method segments.
    #[error("Could not parse method name from '{0}'")]
    InvalidTestName(String),

    // Construction errors
    /// None of the supported constructor shapes is present on a test container.
    #[error("Could not find a suitable constructor for the test containing class '{0}'")]
    NoSuitableConstructor(String),

    /// The selected constructor returned an error or panicked.
    #[error("Failed to construct '{type_name}': {message}")]
    Construction {
        /// Full name of the type being constructed
        type_name: String,
        /// Error reported by the constructor
        message: String,
    },

    // Scope lifecycle errors
    /// A service registration was attempted after the run scope was built.
    #[error("Service registrations are sealed once the run scope is built")]
    ScopeSealed,

    /// The run scope was requested before it was built, or built twice.
    #[error("The run scope is not in the expected state - {0}")]
    ScopeState(&'static str),

    // Discovery errors
    /// A discovery source could not be loaded.
    #[error("Failed to load '{source_name}': {message}")]
    Load {
        /// The source identifier that was being loaded
        source_name: String,
        /// Loader supplied reason
        message: String,
    },
}
