//! Error types.
//!
//! Inside the engine every fallible operation returns [`JsResult`], whose
//! error side is an [`Abrupt`] completion. At the embedding boundary an
//! uncaught exception is reported as a [`JsError`] with the error kind,
//! message and stack snapshot.

use std::fmt;

use crate::{Magic, SourcePosition, StackFrame, Value};

/// The kind of a scriptable error.
///
/// These correspond to the built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Plain `Error`
    Error,
    /// Syntax error detected at run time (e.g. a redeclaration)
    SyntaxError,
    /// Type error (e.g., calling a non-function)
    TypeError,
    /// Reference to an undefined variable or an uninitialized binding
    ReferenceError,
    /// Value out of allowed range
    RangeError,
    /// Error in eval() function
    EvalError,
    /// Error in URI handling functions
    URIError,
    /// Engine-internal condition such as too much recursion
    InternalError,
}

impl ErrorKind {
    /// All kinds, in the order their prototypes are created.
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Error,
        ErrorKind::SyntaxError,
        ErrorKind::TypeError,
        ErrorKind::ReferenceError,
        ErrorKind::RangeError,
        ErrorKind::EvalError,
        ErrorKind::URIError,
        ErrorKind::InternalError,
    ];

    /// The constructor name, e.g. `"TypeError"`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::URIError => "URIError",
            ErrorKind::InternalError => "InternalError",
        }
    }

    /// Look a kind up by constructor name.
    pub fn from_name(name: &str) -> Option<ErrorKind> {
        ErrorKind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An uncaught error as seen by the embedding.
///
/// # Examples
///
/// ```
/// use core_types::{JsError, ErrorKind};
///
/// let error = JsError::new(ErrorKind::ReferenceError, "x is not defined");
/// assert_eq!(error.message, "x is not defined");
/// assert_eq!(error.to_string(), "ReferenceError: x is not defined");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Stack trace (call stack at the time of the error)
    pub stack: Vec<StackFrame>,
    /// Source position where the error occurred
    pub source_position: Option<SourcePosition>,
}

impl JsError {
    /// Create an error without stack or position information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
            source_position: None,
        }
    }

    /// Attach a stack snapshot.
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.source_position = stack.first().map(|frame| SourcePosition {
            line: frame.line,
            column: frame.column,
            offset: 0,
        });
        self.stack = stack;
        self
    }
}

/// An abrupt completion travelling up through the core.
///
/// Only `Throw` is visible to script `catch` clauses. `GeneratorClosing`
/// passes through catches but runs finally blocks; `ForcedReturn` and
/// `Terminated` skip both and only close open for-in iterators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Abrupt {
    /// A catchable exception value
    #[error("uncaught exception: {0}")]
    Throw(Value),
    /// A suspended generator is being closed through `return()`
    #[error("generator closing")]
    GeneratorClosing,
    /// A debugger hook forced the frame to return; the frame's return value
    /// slot already holds the result
    #[error("forced return")]
    ForcedReturn,
    /// Execution was terminated by the host or a debugger
    #[error("execution terminated")]
    Terminated,
}

impl Abrupt {
    /// Whether a catch clause may intercept this completion.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Abrupt::Throw(_))
    }

    /// Whether this completion bypasses catch and finally handling entirely.
    pub fn is_uncatchable(&self) -> bool {
        matches!(self, Abrupt::ForcedReturn | Abrupt::Terminated)
    }

    /// The thrown value, for `Throw`.
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            Abrupt::Throw(v) => Some(v),
            _ => None,
        }
    }

    /// The value a finally block holds while this completion is pending.
    ///
    /// Returns `None` for completions that never enter a finally block.
    pub fn to_finally_value(&self) -> Option<Value> {
        match self {
            Abrupt::Throw(v) => Some(v.clone()),
            Abrupt::GeneratorClosing => Some(Value::Magic(Magic::GeneratorClosing)),
            Abrupt::ForcedReturn | Abrupt::Terminated => None,
        }
    }

    /// Rebuild the completion a finally block rethrows at its end.
    pub fn from_finally_value(value: Value) -> Abrupt {
        if value.is_magic(Magic::GeneratorClosing) {
            Abrupt::GeneratorClosing
        } else {
            Abrupt::Throw(value)
        }
    }
}

/// Result of a core operation that can complete abruptly.
pub type JsResult<T> = Result<T, Abrupt>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ErrorKind::from_name("NotAnError"), None);
    }

    #[test]
    fn test_js_error_display() {
        let error = JsError::new(ErrorKind::TypeError, "test");
        assert_eq!(error.to_string(), "TypeError: test");
    }

    #[test]
    fn test_finally_value_round_trip() {
        let closing = Abrupt::GeneratorClosing;
        let held = closing.to_finally_value().unwrap();
        assert_eq!(Abrupt::from_finally_value(held), Abrupt::GeneratorClosing);

        let thrown = Abrupt::Throw(Value::Int32(1));
        let held = thrown.to_finally_value().unwrap();
        assert_eq!(Abrupt::from_finally_value(held), thrown);

        assert!(Abrupt::Terminated.to_finally_value().is_none());
    }
}
