//! Host-facing errors and the fatal-condition macro.
//!
//! Script-visible failures travel through the core as
//! [`Abrupt`](core_types::Abrupt) values. They only become a [`VmError`] when
//! they escape the outermost activation.

use core_types::{JsError, Value};
use thiserror::Error;

/// An error reported to the embedding.
#[derive(Debug, Error)]
pub enum VmError {
    /// A script exception nobody caught
    #[error("{error}")]
    Uncaught {
        /// Host view of the exception, with the stack at the throw point
        error: JsError,
        /// The thrown value itself
        value: Value,
    },
    /// Execution was terminated by an interrupt, the time limit or a
    /// debugger hook
    #[error("script execution terminated")]
    Terminated,
    /// Engine options could not be parsed
    #[error("invalid engine options: {0}")]
    Options(#[from] serde_json::Error),
    /// A host API was used with an argument of the wrong kind
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl VmError {
    /// The host view of an uncaught exception, if this is one.
    pub fn js_error(&self) -> Option<&JsError> {
        match self {
            VmError::Uncaught { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The thrown value of an uncaught exception, if this is one.
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            VmError::Uncaught { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Abort on an internal-consistency violation.
///
/// Reserved for states the compiler and core rule out statically; reaching
/// one is an engine bug, never a script error.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        panic!("internal error: {}", format_args!($($arg)*))
    };
}
