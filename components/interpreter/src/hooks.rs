//! Debugger hook layer
//!
//! The interpreter calls out to an installed [`DebugHooks`] implementation
//! at fixed points: frame entry and exit, single steps, breakpoints and the
//! `debugger` statement, exception unwinding and native calls. Each callback
//! answers with a [`ResumeMode`] telling the loop how to continue.

use std::rc::Rc;

use core_types::{Abrupt, JsResult, ObjectId, Value};

use crate::call_frame::Frame;
use crate::vm::VM;

/// How execution continues after a hook returns.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeMode {
    /// Carry on as if nothing happened
    Continue,
    /// Return this value from the frame
    Return(Value),
    /// Throw this value from the current point
    Throw(Value),
    /// Stop the activation; nothing catches it
    Terminate,
}

/// Read-only view of an interpreter frame.
#[derive(Debug, Clone)]
pub struct FrameView {
    /// Name of the running script
    pub script_name: Rc<str>,
    /// Pc of the instruction being executed
    pub pc: usize,
    /// Frame depth, 0 for the outermost
    pub depth: usize,
    /// `this`
    pub this: Value,
    /// Function object, if any
    pub callee: Option<ObjectId>,
    /// Invoked with `new`
    pub constructing: bool,
    /// Current return-value slot
    pub return_value: Value,
    /// Source line of the current instruction, when recorded
    pub line: Option<u32>,
}

impl FrameView {
    pub(crate) fn of(frame: &Frame, depth: usize) -> Self {
        let pc = frame.current_pc();
        Self {
            script_name: frame.script.name.clone(),
            pc,
            depth,
            this: frame.this.clone(),
            callee: frame.callee,
            constructing: frame.flags.constructing,
            return_value: frame.rval.clone(),
            line: frame.script.position_at(pc).map(|p| p.line),
        }
    }
}

/// Callbacks a debugger installs on the VM.
///
/// Every method has a do-nothing default, so an implementation only
/// overrides what it needs.
pub trait DebugHooks {
    /// Whether frames of `script_name` are debuggees
    fn observes(&self, _script_name: &str) -> bool {
        true
    }

    /// Whether `on_step` fires for every instruction
    fn is_stepping(&self) -> bool {
        false
    }

    /// Whether a breakpoint is set at `pc` of `script_name`
    fn has_breakpoint(&self, _script_name: &str, _pc: usize) -> bool {
        false
    }

    /// A debuggee frame was entered
    fn on_enter_frame(&mut self, _frame: &FrameView) -> ResumeMode {
        ResumeMode::Continue
    }

    /// A debuggee frame is about to be popped with `completion`
    fn on_leave_frame(&mut self, _frame: &FrameView, _completion: &JsResult<Value>) -> ResumeMode {
        ResumeMode::Continue
    }

    /// About to execute the instruction at `frame.pc` while stepping
    fn on_step(&mut self, _frame: &FrameView) -> ResumeMode {
        ResumeMode::Continue
    }

    /// A breakpoint or `debugger` statement was hit
    fn on_breakpoint(&mut self, _frame: &FrameView) -> ResumeMode {
        ResumeMode::Continue
    }

    /// `exception` is about to unwind out of the current instruction
    fn on_exception_unwind(&mut self, _frame: &FrameView, _exception: &Value) -> ResumeMode {
        ResumeMode::Continue
    }

    /// A native function named `name` is about to be called
    fn on_native_call(&mut self, _name: &str, _constructing: bool) -> ResumeMode {
        ResumeMode::Continue
    }
}

/// Outcome of a hook, as the loop applies it.
#[derive(Debug)]
pub(crate) enum HookOutcome {
    Continue,
    Abrupt(Abrupt),
}

impl VM {
    /// Install debugger hooks; frames entered afterwards become debuggees
    /// if the hooks observe their script.
    pub fn set_debug_hooks(&mut self, hooks: Box<dyn DebugHooks>) {
        self.hooks = Some(hooks);
    }

    /// Remove and return the installed hooks.
    pub fn clear_debug_hooks(&mut self) -> Option<Box<dyn DebugHooks>> {
        self.hooks.take()
    }

    pub(crate) fn observes_script(&self, name: &str) -> bool {
        self.hooks.as_ref().is_some_and(|hooks| hooks.observes(name))
    }

    /// Run `f` against the hooks with a view of the current frame. Hooks are
    /// taken out of the VM for the duration so they cannot re-enter.
    pub(crate) fn with_hooks(&mut self, f: impl FnOnce(&mut dyn DebugHooks, &FrameView) -> ResumeMode) -> ResumeMode {
        let Some(mut hooks) = self.hooks.take() else {
            return ResumeMode::Continue;
        };
        let view = match self.frames.last() {
            Some(frame) => FrameView::of(frame, self.frames.len() - 1),
            None => {
                self.hooks = Some(hooks);
                return ResumeMode::Continue;
            }
        };
        let mode = f(hooks.as_mut(), &view);
        self.hooks = Some(hooks);
        mode
    }

    /// Translate a resume mode into the loop's next step.
    ///
    /// `Return` stores the value in the frame's return slot and unwinds as a
    /// forced return, except while a generator is closing, which keeps
    /// precedence over the forced return.
    pub(crate) fn apply_resume_mode(&mut self, mode: ResumeMode) -> HookOutcome {
        match mode {
            ResumeMode::Continue => HookOutcome::Continue,
            ResumeMode::Throw(value) => HookOutcome::Abrupt(Abrupt::Throw(value)),
            ResumeMode::Terminate => HookOutcome::Abrupt(Abrupt::Terminated),
            ResumeMode::Return(value) => {
                let frame = self.current_frame_mut();
                if frame.flags.closing {
                    log::debug!("ignoring forced return while the generator is closing");
                    return HookOutcome::Continue;
                }
                frame.rval = value;
                HookOutcome::Abrupt(Abrupt::ForcedReturn)
            }
        }
    }

    /// Single-step and breakpoint hooks before executing `pc`.
    pub(crate) fn step_hooks(&mut self, pc: usize) -> JsResult<()> {
        let Some(hooks) = self.hooks.as_ref() else {
            return Ok(());
        };
        let frame = self.current_frame();
        if !frame.flags.debuggee {
            return Ok(());
        }
        let stepping = hooks.is_stepping();
        let breakpoint = hooks.has_breakpoint(&frame.script.name, pc);
        if stepping {
            let mode = self.with_hooks(|hooks, view| hooks.on_step(view));
            if let HookOutcome::Abrupt(abrupt) = self.apply_resume_mode(mode) {
                return Err(abrupt);
            }
        }
        if breakpoint {
            let mode = self.with_hooks(|hooks, view| hooks.on_breakpoint(view));
            if let HookOutcome::Abrupt(abrupt) = self.apply_resume_mode(mode) {
                return Err(abrupt);
            }
        }
        Ok(())
    }
}
