//! Core value types, conversions and error handling for the engine.
//!
//! This crate provides the foundational types shared by every other component:
//! the tagged [`Value`] union, the explicit [`Magic`] sentinel kind, numeric
//! and string conversions with exact language semantics, and the error types
//! used both inside the engine ([`Abrupt`]) and at the embedding boundary
//! ([`JsError`]).
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of script values
//! - [`Magic`] - Internal sentinels (TDZ, generator closing, iterator end)
//! - [`Abrupt`] - Abrupt completion propagated with `?` through the core
//! - [`JsError`] - Host-facing error with a stack snapshot
//! - [`number`] - Number/string conversions (`ToString`, `ToNumber`, `ToInt32`)
//!
//! # Examples
//!
//! ```
//! use core_types::{Value, JsError, ErrorKind};
//!
//! let num = Value::Int32(42);
//! assert!(num.is_truthy());
//! assert_eq!(num.type_of(), "number");
//! assert_eq!(Value::number(3.0), Value::Int32(3));
//!
//! let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
//! assert_eq!(error.to_string(), "TypeError: undefined is not a function");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
pub mod number;
mod source;
mod value;

pub use error::{Abrupt, ErrorKind, JsError, JsResult};
pub use source::{SourcePosition, SourceSpan, StackFrame};
pub use value::{Magic, ObjectId, Symbol, Value};
