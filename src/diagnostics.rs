//! Unified, `miette`-based diagnostics for the harness.
//!
//! Every failure the harness itself can produce (registration, parameter
//! access, query parsing, device collaborator failures, explicit test errors)
//! is a [`CtsError`]. Assertion mismatches are *not* errors: they are recorded
//! as [`AssertionFailure`](crate::fixture::AssertionFailure)s and classify a
//! case as failed rather than errored.
//!
//! # Error Construction Macros
//!
//! - **Use `err_msg!` for message-only errors.**
//!   - `err_msg!(Registration, "duplicate test name '{}'", name)`
//!
//! - **Use `err_help!` when the caller can do something about it.**
//!   - `err_help!(Query, "declare the key in an earlier step", "unknown key '{}'", key)`
//!
//! Both macros format their message eagerly and never attach a source.
//! Device collaborator errors convert through `From<DeviceError>`, so `?`
//! works directly on device futures.

use miette::Diagnostic;
use thiserror::Error;

use crate::device::DeviceError;

/// Type-safe error classification that corresponds to [`CtsError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Duplicate names, malformed parameter specs, invalid identifiers
    Registration,
    /// Missing parameter keys, type mismatches in parameter access
    Param,
    /// Malformed case queries
    Query,
    /// Device collaborator failures other than timeouts
    Device,
    /// A suspension point that the collaborator gave up on
    Timeout,
    /// Errors raised explicitly by test bodies
    Test,
    /// Harness bugs
    Internal,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Registration => "Registration",
            ErrorType::Param => "Param",
            ErrorType::Query => "Query",
            ErrorType::Device => "Device",
            ErrorType::Timeout => "Timeout",
            ErrorType::Test => "Test",
            ErrorType::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for every harness failure mode.
#[derive(Debug, Error, Diagnostic)]
pub enum CtsError {
    #[error("Registration error: {message}")]
    #[diagnostic(code(cts::registration))]
    Registration {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Parameter error: {message}")]
    #[diagnostic(code(cts::param))]
    Param {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Query error: {message}")]
    #[diagnostic(code(cts::query))]
    Query {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Device error: {0}")]
    #[diagnostic(code(cts::device))]
    Device(#[from] DeviceError),

    #[error("Test error: {message}")]
    #[diagnostic(code(cts::test))]
    Test {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Internal error: {message}")]
    #[diagnostic(code(cts::internal))]
    Internal {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl CtsError {
    /// Returns the type-safe classification for this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            CtsError::Registration { .. } => ErrorType::Registration,
            CtsError::Param { .. } => ErrorType::Param,
            CtsError::Query { .. } => ErrorType::Query,
            CtsError::Device(DeviceError::Timeout { .. }) => ErrorType::Timeout,
            CtsError::Device(_) => ErrorType::Device,
            CtsError::Test { .. } => ErrorType::Test,
            CtsError::Internal { .. } => ErrorType::Internal,
        }
    }

    /// True when a device collaborator abandoned a suspension point.
    pub fn is_timeout(&self) -> bool {
        self.error_type() == ErrorType::Timeout
    }

    /// Replaces the help text. Device errors carry no help and are returned unchanged.
    pub fn with_help(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            CtsError::Registration { help, .. }
            | CtsError::Param { help, .. }
            | CtsError::Query { help, .. }
            | CtsError::Test { help, .. }
            | CtsError::Internal { help, .. } => *help = Some(text.into()),
            CtsError::Device(_) => {}
        }
        self
    }
}

/// Constructs a [`CtsError`] variant with a formatted message and no help.
#[macro_export]
macro_rules! err_msg {
    ($variant:ident, $msg:literal $(,)?) => {
        $crate::CtsError::$variant {
            message: format!($msg),
            help: None,
        }
    };
    ($variant:ident, $msg:literal, $($arg:expr),+ $(,)?) => {
        $crate::CtsError::$variant {
            message: format!($msg, $($arg),+),
            help: None,
        }
    };
}

/// Constructs a [`CtsError`] variant with a help message and a formatted message.
#[macro_export]
macro_rules! err_help {
    ($variant:ident, $help:expr, $msg:literal $(,)?) => {
        $crate::CtsError::$variant {
            message: format!($msg),
            help: Some(format!("{}", $help)),
        }
    };
    ($variant:ident, $help:expr, $msg:literal, $($arg:expr),+ $(,)?) => {
        $crate::CtsError::$variant {
            message: format!($msg, $($arg),+),
            help: Some(format!("{}", $help)),
        }
    };
}

#[cfg(test)]
mod diagnostics_tests {
    use miette::Report;

    use super::*;

    #[test]
    fn help_is_rendered_by_report() {
        let err = err_help!(
            Registration,
            "rename one of the tests",
            "duplicate test name '{}'",
            "memcpy"
        );
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("duplicate test name 'memcpy'"));
        assert!(output.contains("rename one of the tests"));
        assert!(output.contains("cts::registration"));
    }

    #[test]
    fn timeouts_are_classified_separately() {
        let err: CtsError = DeviceError::Timeout {
            operation: "read_buffer".to_string(),
        }
        .into();
        assert!(err.is_timeout());
        assert_eq!(err.error_type(), ErrorType::Timeout);

        let lost: CtsError = DeviceError::Lost {
            reason: "unplugged".to_string(),
        }
        .into();
        assert_eq!(lost.error_type(), ErrorType::Device);
    }

    #[test]
    fn with_help_replaces_help_text() {
        let err = err_msg!(Param, "missing key '{}'", "format").with_help("add an options step");
        match err {
            CtsError::Param { help, .. } => assert_eq!(help.as_deref(), Some("add an options step")),
            other => panic!("unexpected variant {other:?}"),
        }
    }
}
