//! Bytecode interpreter for JavaScript runtime
//!
//! This crate provides the execution core of the engine:
//! - A dispatch loop over [`bytecode_system::Opcode`] sharing one value
//!   stack between all frames
//! - The call and construct protocol for interpreted, native and proxy
//!   callees
//! - The unwind state machine driven by a script's try notes
//! - Generators, async functions and a FIFO job queue
//! - Contracts for debugger hooks and a compiled tier, plus cooperative
//!   interrupts
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use interpreter::VM;
//! use bytecode_system::{Opcode, Script};
//! use core_types::Value;
//!
//! let mut vm = VM::new();
//! let mut script = Script::new("main");
//!
//! let idx = script.add_constant("2");
//! script.emit(Opcode::LoadInt(1));
//! script.emit(Opcode::LoadConstant(idx));
//! script.emit(Opcode::Add);
//! script.emit(Opcode::Return);
//!
//! let result = vm.execute(Rc::new(script)).unwrap();
//! assert_eq!(result, Value::from("12"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arith;
mod call;
pub mod call_frame;
mod dispatch;
pub mod environment;
pub mod errors;
pub mod exceptions;
pub mod gc_integration;
pub mod generator;
pub mod hooks;
pub mod interrupt;
mod iteration;
pub mod jit;
mod names;
pub mod natives;
pub mod object;
pub mod options;
pub mod profile;
pub mod promise_integration;
pub mod realm;
mod unwind;
pub mod vm;

// Re-export main types at crate root
pub use arith::{NumericOp, PreferredType};
pub use call::MAX_ACTIVATION_DEPTH;
pub use call_frame::{Frame, FrameFlags};
pub use environment::{EnvironmentKind, EnvironmentRecord};
pub use errors::VmError;
pub use exceptions::render_stack;
pub use generator::{GeneratorKind, GeneratorState};
pub use hooks::{DebugHooks, FrameView, ResumeMode};
pub use interrupt::{InterruptCallback, InterruptHandle};
pub use jit::{CompiledTier, ResumePoint, TierEntry};
pub use object::{CallArgs, NativeFn, PropertyKey};
pub use options::EngineOptions;
pub use profile::{ProfileData, ScriptCounters};
pub use promise_integration::PromiseState;
pub use vm::VM;
