//! Interpreter activation records
//!
//! All frames share the VM's value stack. A frame owns the slice starting at
//! `base`: first `script.local_count` fixed slots, then its operand area.
//! Arguments are held by the frame itself so they stay addressable after the
//! caller's operand area has been reused.

use std::rc::Rc;

use bytecode_system::Script;
use core_types::{ObjectId, Value};
use memory_manager::{Trace, Tracer};

/// Per-frame flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// Invoked with `new`
    pub constructing: bool,
    /// Generator or async function body
    pub generator: bool,
    /// Debugger hooks observe this frame
    pub debuggee: bool,
    /// Unwinding because the generator is being closed
    pub closing: bool,
    /// Pushed by `super()`: the result initializes the caller's `this`
    pub super_call: bool,
}

/// One function activation (or top-level execution).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Code being executed
    pub script: Rc<Script>,
    /// Index of the next instruction
    pub pc: usize,
    /// First stack slot owned by the frame
    pub base: usize,
    /// Current innermost environment
    pub env: ObjectId,
    /// Function object, absent for top-level code
    pub callee: Option<ObjectId>,
    /// `this` binding; uninitialized in derived constructors until `super()`
    pub this: Value,
    /// `new.target`
    pub new_target: Value,
    /// Arguments, padded with undefined up to the formal count
    pub args: Vec<Value>,
    /// Number of arguments actually passed
    pub argc: usize,
    /// Return-value slot
    pub rval: Value,
    /// Flags
    pub flags: FrameFlags,
    /// Scopes of the environments pushed by this frame, innermost last
    pub env_scopes: Vec<u32>,
    /// Generator object, for generator and async frames
    pub generator: Option<ObjectId>,
    /// Materialized arguments object
    pub args_obj: Option<ObjectId>,
}

impl Frame {
    /// Create a frame at pc 0
    pub fn new(script: Rc<Script>, base: usize, env: ObjectId) -> Self {
        Self {
            script,
            pc: 0,
            base,
            env,
            callee: None,
            this: Value::Undefined,
            new_target: Value::Undefined,
            args: Vec::new(),
            argc: 0,
            rval: Value::Undefined,
            flags: FrameFlags::default(),
            env_scopes: Vec::new(),
            generator: None,
            args_obj: None,
        }
    }

    /// Stack index of the first operand slot
    pub fn operand_base(&self) -> usize {
        self.base + self.script.local_count as usize
    }

    /// Operand depth for a stack of the given height
    pub fn stack_depth(&self, stack_len: usize) -> usize {
        stack_len.saturating_sub(self.operand_base())
    }

    /// Pc of the instruction being executed
    pub fn current_pc(&self) -> usize {
        self.pc.saturating_sub(1)
    }

    /// Whether the body is strict code
    pub fn is_strict(&self) -> bool {
        self.script.flags.strict
    }
}

impl Trace for Frame {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark(self.env);
        self.callee.trace(tracer);
        tracer.mark_value(&self.this);
        tracer.mark_value(&self.new_target);
        tracer.mark_values(&self.args);
        tracer.mark_value(&self.rval);
        self.generator.trace(tracer);
        self.args_obj.trace(tracer);
    }
}
