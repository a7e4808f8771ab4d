//! Bytecode system for the JavaScript runtime
//!
//! This crate defines what the compiler hands to the interpreter: the
//! [`Script`] container, the stack-machine [`Opcode`] set, scope descriptors
//! and the exception-handler table.
//!
//! # Features
//!
//! - Stack-based bytecode with absolute jump targets
//! - Per-binding-kind name opcodes selected through [`NameLocation`]
//! - Scope notes for environment unwinding
//! - Try notes for catch, finally and iterator cleanup
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Opcode, Script};
//!
//! let mut script = Script::new("main");
//!
//! // Add constants
//! let idx = script.add_constant(42.0);
//!
//! // Emit instructions
//! script.emit(Opcode::LoadConstant(idx));
//! script.emit(Opcode::Return);
//!
//! assert_eq!(script.instruction_count(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constant;
pub mod instruction;
pub mod opcode;
pub mod scope;
pub mod script;
pub mod try_note;

// Re-export main types at crate root
pub use constant::Constant;
pub use instruction::Instruction;
pub use opcode::{EnvironmentCoordinate, GeneratorResumeKind, Opcode, ThrowMsgKind};
pub use scope::{BindingKind, BindingLocation, BindingName, NameLocation, ScopeData, ScopeKind, ScopeNote};
pub use script::{Script, ScriptFlags, ScriptId};
pub use try_note::{TryNote, TryNoteIter, TryNoteKind};
