//! Generators, async functions and async generators
//!
//! All three share one mechanism. The body's `Generator` opcode creates a
//! generator object; `InitialYield`, `Yield` and `Await` move the running
//! frame and its slice of the value stack into that object, and resuming
//! moves them back onto the stack and re-enters the dispatch loop at the
//! saved pc with `[value, generator, resumeKind]` pushed.

use std::collections::VecDeque;

use bytecode_system::GeneratorResumeKind;
use core_types::{Abrupt, JsResult, ObjectId, Value};
use memory_manager::{Trace, Tracer};

use crate::call_frame::Frame;
use crate::dispatch::Flow;
use crate::object::ops::missing_receiver;
use crate::object::{JsObject, ObjectClass, PropertyKey};
use crate::vm::VM;

/// Which kind of function body a generator object drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    /// `function*`
    Sync,
    /// `async function`
    Async,
    /// `async function*`
    AsyncGenerator,
}

/// Lifecycle of a generator object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created, body not entered past `InitialYield`
    SuspendedStart,
    /// Suspended at a `Yield` or `Await`
    SuspendedYield,
    /// Body is on the frame stack
    Running,
    /// Finished; never resumes again
    Closed,
}

/// Why a generator last suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendKind {
    /// `InitialYield` or `Yield`
    Yield,
    /// `Await`; only a job resumes it
    Await,
}

/// A suspended activation: the frame and its stack slice.
#[derive(Debug, Clone)]
pub struct Continuation {
    /// Frame as it was at suspension; `base` is rewritten on resumption
    pub frame: Frame,
    /// Fixed slots followed by live operands
    pub values: Vec<Value>,
    /// Suspension kind
    pub kind: SuspendKind,
}

/// A pending `next`/`return`/`throw` on an async generator.
#[derive(Debug, Clone)]
pub struct AsyncGeneratorRequest {
    /// How to resume
    pub kind: GeneratorResumeKind,
    /// Argument of the call
    pub value: Value,
    /// Promise handed back to the caller
    pub promise: ObjectId,
}

/// Internal state of a generator object.
#[derive(Debug, Clone)]
pub struct GeneratorData {
    /// Body kind
    pub kind: GeneratorKind,
    /// Lifecycle state
    pub state: GeneratorState,
    /// Saved activation while suspended
    pub continuation: Option<Continuation>,
    /// Result promise of an async function
    pub promise: Option<ObjectId>,
    /// Queued requests of an async generator
    pub requests: VecDeque<AsyncGeneratorRequest>,
}

impl GeneratorData {
    /// A running generator of `kind`
    pub fn new(kind: GeneratorKind, promise: Option<ObjectId>) -> Self {
        Self {
            kind,
            state: GeneratorState::Running,
            continuation: None,
            promise,
            requests: VecDeque::new(),
        }
    }

    /// Whether the generator is parked at an `Await`
    pub fn is_awaiting(&self) -> bool {
        self.state == GeneratorState::SuspendedYield
            && matches!(&self.continuation, Some(c) if c.kind == SuspendKind::Await)
    }
}

impl Trace for GeneratorData {
    fn trace(&self, tracer: &mut Tracer) {
        if let Some(continuation) = &self.continuation {
            continuation.frame.trace(tracer);
            tracer.mark_values(&continuation.values);
        }
        self.promise.trace(tracer);
        for request in &self.requests {
            tracer.mark_value(&request.value);
            tracer.mark(request.promise);
        }
    }
}

impl VM {
    pub(crate) fn generator(&self, id: ObjectId) -> &GeneratorData {
        match &self.object(id).class {
            ObjectClass::Generator(data) => data,
            _ => crate::fatal!("object {} is not a generator", id),
        }
    }

    pub(crate) fn generator_mut(&mut self, id: ObjectId) -> &mut GeneratorData {
        match &mut self.object_mut(id).class {
            ObjectClass::Generator(data) => data,
            _ => crate::fatal!("object {} is not a generator", id),
        }
    }

    /// `Generator`: create the generator object of the running frame.
    pub(crate) fn create_generator(&mut self) -> ObjectId {
        let frame = self.current_frame();
        let flags = frame.script.flags;
        let callee = frame.callee;
        let kind = match (flags.generator, flags.is_async) {
            (true, true) => GeneratorKind::AsyncGenerator,
            (false, true) => GeneratorKind::Async,
            _ => GeneratorKind::Sync,
        };
        let fallback = match kind {
            GeneratorKind::Sync => self.realm.protos.generator,
            GeneratorKind::AsyncGenerator => self.realm.protos.async_generator,
            GeneratorKind::Async => self.realm.protos.object,
        };
        // A generator function's own `prototype` is the instance prototype.
        let proto = callee
            .and_then(|callee| self.object(callee).properties.get(&PropertyKey::from("prototype")).cloned())
            .and_then(|p| p.value().and_then(Value::as_object))
            .filter(|_| kind != GeneratorKind::Async)
            .unwrap_or(fallback);
        let promise = (kind == GeneratorKind::Async).then(|| self.new_promise());
        let _promise_guard = promise.map(|p| self.root_object(p));
        let generator = self.alloc(JsObject::new(
            Some(proto),
            ObjectClass::Generator(GeneratorData::new(kind, promise)),
        ));
        self.current_frame_mut().generator = Some(generator);
        log::debug!("created {:?} generator {}", kind, generator);
        generator
    }

    /// Move the running frame into its generator object.
    ///
    /// `InitialYield` expects `[gen]` on the stack, `Yield` and `Await`
    /// expect `[value, gen]`. Returns the value handed to whoever resumed
    /// or called the body.
    pub(crate) fn suspend_generator(&mut self, kind: SuspendKind, initial: bool) -> JsResult<Flow> {
        let generator = match self.pop() {
            Value::Object(id) => id,
            other => crate::fatal!("suspension without a generator object: {:?}", other),
        };
        let value = if initial { Value::Object(generator) } else { self.pop() };
        let generator_kind = self.generator(generator).kind;

        if initial && generator_kind == GeneratorKind::Async {
            // Async function bodies run synchronously up to the first await.
            self.stack.push(Value::Undefined);
            self.stack.push(Value::Object(generator));
            self.stack.push(Value::Int32(GeneratorResumeKind::Next.to_i32()));
            return Ok(Flow::Next);
        }

        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => crate::fatal!("suspension without a frame"),
        };
        let values = self.stack.split_off(frame.base);
        let data = self.generator_mut(generator);
        data.state = if initial {
            GeneratorState::SuspendedStart
        } else {
            GeneratorState::SuspendedYield
        };
        data.continuation = Some(Continuation { frame, values, kind });
        let promise = data.promise;
        log::debug!("generator {} suspended ({:?})", generator, kind);

        if kind == SuspendKind::Await {
            self.await_value(generator, value)?;
            return Ok(Flow::Suspend(promise.map_or(Value::Undefined, Value::Object)));
        }
        Ok(Flow::Suspend(value))
    }

    /// Move a suspended generator back onto the stack and run it until it
    /// suspends again or completes.
    ///
    /// Returns the yielded value, or the completion value once the state is
    /// [`GeneratorState::Closed`].
    pub(crate) fn resume_generator(
        &mut self,
        generator: ObjectId,
        kind: GeneratorResumeKind,
        value: Value,
    ) -> JsResult<Value> {
        self.enter_activation()?;
        let data = self.generator_mut(generator);
        let Some(continuation) = data.continuation.take() else {
            crate::fatal!("resuming generator {} without a continuation", generator);
        };
        data.state = GeneratorState::Running;
        let Continuation { mut frame, values, .. } = continuation;
        frame.base = self.stack.len();
        frame.flags.closing = false;
        self.stack.extend(values);
        self.stack.push(value);
        self.stack.push(Value::Object(generator));
        self.stack.push(Value::Int32(kind.to_i32()));
        let depth = self.frames.len();
        self.frames.push(frame);
        log::debug!("resuming generator {} with {:?}", generator, kind);
        let result = self.run(depth, Ok(Flow::Next));
        self.leave_activation();
        result
    }

    /// `CheckResumeKind`: `[value, gen, kind] -> [value]`, throwing or
    /// starting the close for non-`next` resumptions.
    pub(crate) fn check_resume_kind(&mut self) -> JsResult<()> {
        let kind = match self.pop() {
            Value::Int32(n) => GeneratorResumeKind::from_i32(n),
            _ => None,
        };
        let _generator = self.pop();
        match kind {
            Some(GeneratorResumeKind::Next) => Ok(()),
            Some(GeneratorResumeKind::Throw) => Err(Abrupt::Throw(self.pop())),
            Some(GeneratorResumeKind::Return) => {
                let value = self.pop();
                let frame = self.current_frame_mut();
                frame.rval = value;
                frame.flags.closing = true;
                Err(Abrupt::GeneratorClosing)
            }
            None => crate::fatal!("malformed resume kind"),
        }
    }

    /// `next`, `return` and `throw` of a synchronous generator.
    pub(crate) fn generator_method(&mut self, this: &Value, kind: GeneratorResumeKind, value: Value) -> JsResult<Value> {
        let generator = match this {
            Value::Object(id)
                if matches!(&self.object(*id).class, ObjectClass::Generator(g) if g.kind == GeneratorKind::Sync) =>
            {
                *id
            }
            _ => return Err(missing_receiver(self, method_name(kind))),
        };
        let state = self.generator(generator).state;
        match state {
            GeneratorState::Running => return Err(self.type_error("already executing generator")),
            GeneratorState::Closed => return self.closed_result(kind, value),
            GeneratorState::SuspendedStart if kind != GeneratorResumeKind::Next => {
                self.close_generator(generator);
                return self.closed_result(kind, value);
            }
            _ => {}
        }
        let result = self.resume_generator(generator, kind, value)?;
        let done = self.generator(generator).state == GeneratorState::Closed;
        Ok(Value::Object(self.create_iter_result(result, done)))
    }

    fn closed_result(&mut self, kind: GeneratorResumeKind, value: Value) -> JsResult<Value> {
        match kind {
            GeneratorResumeKind::Next => Ok(Value::Object(self.create_iter_result(Value::Undefined, true))),
            GeneratorResumeKind::Return => Ok(Value::Object(self.create_iter_result(value, true))),
            GeneratorResumeKind::Throw => Err(Abrupt::Throw(value)),
        }
    }

    pub(crate) fn close_generator(&mut self, generator: ObjectId) {
        let data = self.generator_mut(generator);
        data.state = GeneratorState::Closed;
        data.continuation = None;
    }

    /// `next`, `return` and `throw` of an async generator: queue the request
    /// and hand back its promise.
    pub(crate) fn async_generator_enqueue(
        &mut self,
        this: &Value,
        kind: GeneratorResumeKind,
        value: Value,
    ) -> JsResult<Value> {
        let promise = self.new_promise();
        let _guard = self.root_object(promise);
        let generator = match this {
            Value::Object(id)
                if matches!(&self.object(*id).class,
                    ObjectClass::Generator(g) if g.kind == GeneratorKind::AsyncGenerator) =>
            {
                *id
            }
            _ => {
                let Abrupt::Throw(error) = missing_receiver(self, method_name(kind)) else {
                    crate::fatal!("receiver check produced a non-throw completion");
                };
                self.reject_promise(promise, error);
                return Ok(Value::Object(promise));
            }
        };
        self.generator_mut(generator)
            .requests
            .push_back(AsyncGeneratorRequest { kind, value, promise });
        if self.generator(generator).state != GeneratorState::Running {
            self.async_generator_drain(generator)?;
        }
        Ok(Value::Object(promise))
    }

    /// Serve queued requests until the queue is empty or the body is
    /// running or awaiting.
    pub(crate) fn async_generator_drain(&mut self, generator: ObjectId) -> JsResult<()> {
        loop {
            let data = self.generator(generator);
            if data.state == GeneratorState::Running || data.is_awaiting() {
                return Ok(());
            }
            let Some(request) = data.requests.front().cloned() else {
                return Ok(());
            };
            let state = data.state;
            let immediate = match state {
                GeneratorState::Closed => true,
                GeneratorState::SuspendedStart if request.kind != GeneratorResumeKind::Next => {
                    self.close_generator(generator);
                    true
                }
                _ => false,
            };
            if immediate {
                self.generator_mut(generator).requests.pop_front();
                match request.kind {
                    GeneratorResumeKind::Next => self.resolve_iter_result(request.promise, Value::Undefined, true),
                    GeneratorResumeKind::Return => self.resolve_iter_result(request.promise, request.value, true),
                    GeneratorResumeKind::Throw => self.reject_promise(request.promise, request.value),
                }
                continue;
            }
            let result = self.resume_generator(generator, request.kind, request.value);
            self.async_generator_settle(generator, result)?;
        }
    }

    /// Settle the front request after the body suspended or completed.
    pub(crate) fn async_generator_settle(&mut self, generator: ObjectId, result: JsResult<Value>) -> JsResult<()> {
        let data = self.generator(generator);
        if data.is_awaiting() {
            return Ok(());
        }
        let done = data.state == GeneratorState::Closed;
        let Some(request) = self.generator_mut(generator).requests.pop_front() else {
            return result.map(|_| ());
        };
        match result {
            Ok(value) => self.resolve_iter_result(request.promise, value, done),
            Err(Abrupt::Throw(error)) => self.reject_promise(request.promise, error),
            Err(abrupt) => return Err(abrupt),
        }
        Ok(())
    }

    fn resolve_iter_result(&mut self, promise: ObjectId, value: Value, done: bool) {
        let _guard = self.root_object(promise);
        let result = self.create_iter_result(value, done);
        self.resolve_promise(promise, Value::Object(result));
    }

    /// State of a generator object, for embedders and tests.
    pub fn generator_state(&self, value: &Value) -> Option<GeneratorState> {
        match value {
            Value::Object(id) => match &self.heap_object(*id)?.class {
                ObjectClass::Generator(data) => Some(data.state),
                _ => None,
            },
            _ => None,
        }
    }
}

fn method_name(kind: GeneratorResumeKind) -> &'static str {
    match kind {
        GeneratorResumeKind::Next => "next",
        GeneratorResumeKind::Return => "return",
        GeneratorResumeKind::Throw => "throw",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode_system::Script;
    use std::rc::Rc;

    #[test]
    fn test_awaiting_requires_await_continuation() {
        let mut data = GeneratorData::new(GeneratorKind::AsyncGenerator, None);
        assert!(!data.is_awaiting());
        data.state = GeneratorState::SuspendedYield;
        data.continuation = Some(Continuation {
            frame: Frame::new(Rc::new(Script::new("g")), 0, ObjectId::new(0, 0)),
            values: Vec::new(),
            kind: SuspendKind::Await,
        });
        assert!(data.is_awaiting());
        if let Some(c) = data.continuation.as_mut() {
            c.kind = SuspendKind::Yield;
        }
        assert!(!data.is_awaiting());
    }

    #[test]
    fn test_trace_covers_continuation_and_requests() {
        let mut data = GeneratorData::new(GeneratorKind::AsyncGenerator, Some(ObjectId::new(9, 0)));
        data.continuation = Some(Continuation {
            frame: Frame::new(Rc::new(Script::new("g")), 0, ObjectId::new(1, 0)),
            values: vec![Value::Object(ObjectId::new(2, 0))],
            kind: SuspendKind::Yield,
        });
        data.requests.push_back(AsyncGeneratorRequest {
            kind: GeneratorResumeKind::Next,
            value: Value::Object(ObjectId::new(3, 0)),
            promise: ObjectId::new(4, 0),
        });
        let mut tracer = Tracer::new();
        data.trace(&mut tracer);
        assert_eq!(tracer.pending(), 5);
    }
}
