//! Exception unwinding and frame completion
//!
//! An abrupt completion inside a frame first consults the frame's try notes,
//! innermost first. Catch and finally notes resume execution inside the
//! frame; for-in and destructuring notes clean up and keep scanning. When no
//! note claims the completion the frame is popped through
//! [`VM::complete_frame`] and the caller gets the same treatment.

use core_types::{Abrupt, JsResult, Magic, Value};
use bytecode_system::{TryNote, TryNoteKind};

use crate::call_frame::FrameFlags;
use crate::generator::GeneratorKind;
use crate::hooks::{FrameView, HookOutcome, ResumeMode};
use crate::vm::VM;

impl VM {
    /// Look for a handler for `abrupt` in the running frame.
    ///
    /// `Ok(())` means execution continues in the frame at the handler;
    /// `Err` hands back the completion to propagate to the caller.
    pub(crate) fn handle_error(&mut self, mut abrupt: Abrupt) -> Result<(), Abrupt> {
        if let Abrupt::Throw(value) = &abrupt {
            // An exception raised while closing replaces the close.
            self.current_frame_mut().flags.closing = false;
            if self.hooks.is_some() && self.current_frame().flags.debuggee {
                let value = value.clone();
                let mode = self.with_hooks(|hooks, view| hooks.on_exception_unwind(view, &value));
                if mode != ResumeMode::Continue {
                    if let HookOutcome::Abrupt(replaced) = self.apply_resume_mode(mode) {
                        abrupt = replaced;
                    }
                }
            }
        }

        'rescan: loop {
            let frame = self.current_frame();
            let pc = frame.current_pc();
            let depth = frame.stack_depth(self.stack.len());
            let notes: Vec<TryNote> = frame.script.try_notes_at(pc, depth).copied().collect();

            for note in notes {
                match note.kind {
                    TryNoteKind::Catch => {
                        // A closing generator runs finally blocks but no catch.
                        let Abrupt::Throw(value) = &abrupt else {
                            continue;
                        };
                        let value = value.clone();
                        self.unwind_to_note(&note);
                        log::debug!("exception caught at pc {}", note.handler_pc());
                        self.pending_exception = Some(value);
                        self.current_frame_mut().pc = note.handler_pc();
                        return Ok(());
                    }
                    TryNoteKind::Finally => {
                        let Some(value) = abrupt.to_finally_value() else {
                            continue;
                        };
                        self.unwind_to_note(&note);
                        log::debug!("entering finally block at pc {}", note.handler_pc());
                        self.stack.push(Value::Boolean(true));
                        self.stack.push(value);
                        self.current_frame_mut().pc = note.handler_pc();
                        return Ok(());
                    }
                    TryNoteKind::ForIn => {
                        let iterator = self.note_operand(&note, 1);
                        self.close_for_in(&iterator);
                    }
                    TryNoteKind::Destructuring => {
                        if abrupt.is_uncatchable() {
                            continue;
                        }
                        let done = self.note_operand(&note, 1);
                        if done.is_truthy() {
                            continue;
                        }
                        let iterator = self.note_operand(&note, 2);
                        let _guard = self.root(&iterator);
                        let _pending = abrupt.thrown_value().and_then(|v| self.root(v));
                        if let Err(nested) = self.close_iterator_on_throw(&iterator) {
                            log::debug!("iterator close failed during unwinding, rethrowing from pc {}", note.start);
                            abrupt = nested;
                            self.current_frame_mut().pc = note.start as usize;
                            continue 'rescan;
                        }
                    }
                    TryNoteKind::ForOf | TryNoteKind::ForOfIterClose | TryNoteKind::Loop => {}
                }
            }
            return Err(abrupt);
        }
    }

    /// Operand `from_top` slots below the depth recorded in `note`.
    fn note_operand(&self, note: &TryNote, from_top: usize) -> Value {
        let frame = self.current_frame();
        let index = frame.operand_base() + note.stack_depth as usize;
        match index.checked_sub(from_top).and_then(|i| self.stack.get(i)) {
            Some(value) => value.clone(),
            None => crate::fatal!("try note operand below the frame in {}", frame.script.name),
        }
    }

    /// Reset the operand stack and environment chain to the state at the
    /// start of `note`'s range.
    fn unwind_to_note(&mut self, note: &TryNote) {
        let frame = self.current_frame();
        let height = frame.operand_base() + note.stack_depth as usize;
        let target = frame.script.innermost_scope(note.unwind_scope_pc());
        self.stack.truncate(height);
        self.unwind_environments(target);
    }

    /// Pop the running frame with `result`.
    ///
    /// Applies the constructor return rules, the leave-frame hook and
    /// generator bookkeeping, and returns the completion the caller sees
    /// along with the popped frame's flags.
    pub(crate) fn complete_frame(&mut self, result: JsResult<Value>) -> (JsResult<Value>, FrameFlags) {
        let frame = self.current_frame();
        let flags = frame.flags;
        let mut result = match result {
            Err(Abrupt::ForcedReturn) | Err(Abrupt::GeneratorClosing) => Ok(frame.rval.clone()),
            other => other,
        };

        if flags.constructing {
            result = match result {
                Ok(value) if value.is_object() => Ok(value),
                Ok(value) => self.constructor_result(value),
                other => other,
            };
        }

        if flags.debuggee && self.hooks.is_some() {
            let depth = self.frames.len() - 1;
            let view = FrameView::of(self.current_frame(), depth);
            if let Some(mut hooks) = self.hooks.take() {
                let mode = hooks.on_leave_frame(&view, &result);
                self.hooks = Some(hooks);
                result = match mode {
                    ResumeMode::Continue => result,
                    ResumeMode::Return(value) => Ok(value),
                    ResumeMode::Throw(value) => Err(Abrupt::Throw(value)),
                    ResumeMode::Terminate => Err(Abrupt::Terminated),
                };
            }
        }

        let _value_guard = match &result {
            Ok(value) | Err(Abrupt::Throw(value)) => self.root(value),
            _ => None,
        };
        let generator = self.current_frame().generator;
        let _generator_guard = generator.map(|g| self.root_object(g));
        let Some(frame) = self.frames.pop() else {
            crate::fatal!("completing a frame with an empty frame stack");
        };
        self.stack.truncate(frame.base);
        log::trace!("leaving {} at depth {}", frame.script.name, self.frames.len());

        if let Some(generator) = generator {
            let kind = self.generator(generator).kind;
            let promise = self.generator(generator).promise;
            self.close_generator(generator);
            log::debug!("generator {} closed", generator);
            if let (GeneratorKind::Async, Some(promise)) = (kind, promise) {
                match result {
                    Ok(value) => self.resolve_promise(promise, value),
                    Err(Abrupt::Throw(reason)) => self.reject_promise(promise, reason),
                    Err(other) => return (Err(other), flags),
                }
                result = Ok(Value::Object(promise));
            }
        }
        (result, flags)
    }

    /// Result of a constructor frame that returned a primitive.
    fn constructor_result(&mut self, value: Value) -> JsResult<Value> {
        let frame = self.current_frame();
        let this = frame.this.clone();
        if frame.script.flags.derived_class_constructor {
            if !value.is_undefined() {
                return Err(self.type_error("derived class constructor returned invalid value"));
            }
            if this.is_magic(Magic::UninitializedLexical) {
                return Err(self.reference_error(
                    "must call super constructor before using 'this' in derived class constructor",
                ));
            }
        }
        Ok(this)
    }

    /// `CheckReturn`: validate a derived constructor's completion before
    /// `RetRval`, leaving the result in the return slot.
    pub(crate) fn check_return(&mut self, this: Value) -> JsResult<()> {
        let rval = self.current_frame().rval.clone();
        if rval.is_object() {
            return Ok(());
        }
        if !rval.is_undefined() {
            return Err(self.type_error("derived class constructor returned invalid value"));
        }
        if this.is_magic(Magic::UninitializedLexical) {
            return Err(self.reference_error(
                "must call super constructor before using 'this' in derived class constructor",
            ));
        }
        self.current_frame_mut().rval = this;
        Ok(())
    }

    /// `Retsub`: leave a finally block, rethrowing or jumping back.
    pub(crate) fn retsub(&mut self) -> JsResult<()> {
        let value = self.pop();
        let flag = self.pop();
        match flag {
            Value::Boolean(true) => {
                let abrupt = Abrupt::from_finally_value(value);
                if abrupt == Abrupt::GeneratorClosing {
                    // A throw handled inside the finally block cleared the flag.
                    self.current_frame_mut().flags.closing = true;
                }
                Err(abrupt)
            }
            Value::Boolean(false) => {
                let index = match value {
                    Value::Int32(index) if index >= 0 => index as usize,
                    other => crate::fatal!("Retsub with resume index {:?}", other),
                };
                let frame = self.current_frame_mut();
                match frame.script.resume_offsets.get(index) {
                    Some(&offset) => {
                        frame.pc = offset as usize;
                        Ok(())
                    }
                    None => crate::fatal!("Retsub resume index {} out of range", index),
                }
            }
            other => crate::fatal!("Retsub with a malformed finally pair: {:?}", other),
        }
    }
}
