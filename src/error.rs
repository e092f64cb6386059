//! Error types for the interpreter
//!
//! Two families live here. `JsError` covers everything a guest script can
//! observe (and catch) plus host-facing failures; `EngineError` is the
//! interpreter-defect family that unwinds past every guest `catch`/`finally`.

use thiserror::Error;

use crate::value::JsValue;

/// Source location information for error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Main error type for the interpreter
#[derive(Debug, Clone, Error)]
pub enum JsError {
    #[error("SyntaxError: {message} at {location}")]
    SyntaxError {
        message: String,
        location: SourceLocation,
    },

    #[error("TypeError: {message}")]
    TypeError { message: String },

    #[error("ReferenceError: {message}")]
    ReferenceError { message: String },

    #[error("RangeError: {message}")]
    RangeError { message: String },

    /// A guest value in flight (from `throw`, a rejected await, ...)
    #[error("Uncaught {}", describe_thrown(.0))]
    Thrown(JsValue),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Interpreter defects. Never converted into guest exceptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    #[error("unreachable label: {kind} {}", .label.as_deref().unwrap_or("<none>"))]
    UnreachableLabel {
        kind: &'static str,
        label: Option<String>,
    },

    #[error("generator resumed while already executing")]
    ReentrantGenerator,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("continuation delivered to halted invocation #{0}")]
    InvocationHalted(u64),

    #[error("no execution is active")]
    NoActiveExecution,

    #[error("a task is in progress; finish it with run() first")]
    TaskInProgress,

    /// A native callback could not pause; the task is being aborted
    #[error("native callback interrupted")]
    Interrupted,
}

fn describe_thrown(value: &JsValue) -> String {
    crate::value::describe(value)
}

impl JsError {
    pub fn syntax_error(message: impl Into<String>, line: u32, column: u32) -> Self {
        JsError::SyntaxError {
            message: message.into(),
            location: SourceLocation { line, column },
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        JsError::TypeError {
            message: message.into(),
        }
    }

    /// `ReferenceError: <name> is not defined`
    pub fn reference_error(name: impl std::fmt::Display) -> Self {
        JsError::ReferenceError {
            message: format!("{} is not defined", name),
        }
    }

    pub fn reference_error_with_message(message: impl Into<String>) -> Self {
        JsError::ReferenceError {
            message: message.into(),
        }
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        JsError::RangeError {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        JsError::Engine(EngineError::InvariantViolation(message.into()))
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        JsError::Engine(EngineError::UnsupportedConstruct(what.into()))
    }

    pub fn thrown(value: JsValue) -> Self {
        JsError::Thrown(value)
    }

    /// Engine errors bypass guest exception handling entirely.
    pub fn is_engine(&self) -> bool {
        matches!(self, JsError::Engine(_))
    }

    /// Name of the guest error constructor this error materializes as.
    pub fn guest_kind(&self) -> Option<&'static str> {
        match self {
            JsError::SyntaxError { .. } => Some("SyntaxError"),
            JsError::TypeError { .. } => Some("TypeError"),
            JsError::ReferenceError { .. } => Some("ReferenceError"),
            JsError::RangeError { .. } => Some("RangeError"),
            JsError::Thrown(_) | JsError::Engine(_) => None,
        }
    }

    /// Message carried by a typed guest error
    pub fn message(&self) -> String {
        match self {
            JsError::SyntaxError { message, .. }
            | JsError::TypeError { message }
            | JsError::ReferenceError { message }
            | JsError::RangeError { message } => message.clone(),
            JsError::Thrown(value) => describe_thrown(value),
            JsError::Engine(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = JsError::reference_error("foo");
        assert_eq!(err.to_string(), "ReferenceError: foo is not defined");

        let err = JsError::syntax_error("Unexpected token", 3, 7);
        assert_eq!(err.to_string(), "SyntaxError: Unexpected token at 3:7");

        let err: JsError = EngineError::ReentrantGenerator.into();
        assert!(err.is_engine());
        assert_eq!(err.guest_kind(), None);
    }

    #[test]
    fn test_unreachable_label_display() {
        let err = EngineError::UnreachableLabel {
            kind: "break",
            label: Some("outer".to_string()),
        };
        assert_eq!(err.to_string(), "unreachable label: break outer");
    }
}
