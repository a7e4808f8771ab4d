//! Promise integration between async functions and the job queue
//!
//! Promises here are the minimum async functions and async generators need:
//! a settled-once state, a result and a list of reactions. Settling moves
//! the reactions onto the VM's FIFO job queue; [`VM::run_jobs`] drains it.

use bytecode_system::GeneratorResumeKind;
use core_types::{JsResult, ObjectId, Value};
use memory_manager::{Trace, Tracer};

use crate::errors::VmError;
use crate::generator::GeneratorKind;
use crate::object::{JsObject, ObjectClass};
use crate::vm::VM;

/// Settlement state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// Not yet settled
    Pending,
    /// Settled with a value
    Fulfilled,
    /// Settled with a reason
    Rejected,
}

/// Work to schedule once a promise settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Resume an async body parked at `Await`
    ResumeAsync {
        /// The awaiting generator object
        generator: ObjectId,
    },
    /// Settle another promise the same way
    Adopt {
        /// The adopting promise
        promise: ObjectId,
    },
}

/// Internal state of a promise object.
#[derive(Debug, Clone)]
pub struct PromiseData {
    /// Current state
    pub state: PromiseState,
    /// Fulfillment value or rejection reason
    pub result: Value,
    /// Reactions registered while pending
    pub reactions: Vec<Reaction>,
}

impl PromiseData {
    /// A pending promise
    pub fn new() -> Self {
        Self {
            state: PromiseState::Pending,
            result: Value::Undefined,
            reactions: Vec::new(),
        }
    }
}

impl Default for PromiseData {
    fn default() -> Self {
        Self::new()
    }
}

impl Trace for PromiseData {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_value(&self.result);
        for reaction in &self.reactions {
            match reaction {
                Reaction::ResumeAsync { generator } => tracer.mark(*generator),
                Reaction::Adopt { promise } => tracer.mark(*promise),
            }
        }
    }
}

/// A queued job.
#[derive(Debug, Clone)]
pub enum Job {
    /// Resume an async body with a settled value
    ResumeAsync {
        /// The awaiting generator object
        generator: ObjectId,
        /// `Next` for fulfillment, `Throw` for rejection
        kind: GeneratorResumeKind,
        /// Settled value
        value: Value,
    },
    /// Copy the settled state of `source` into `promise`
    Adopt {
        /// The adopting promise
        promise: ObjectId,
        /// The settled promise
        source: ObjectId,
    },
}

impl Trace for Job {
    fn trace(&self, tracer: &mut Tracer) {
        match self {
            Job::ResumeAsync { generator, value, .. } => {
                tracer.mark(*generator);
                tracer.mark_value(value);
            }
            Job::Adopt { promise, source } => {
                tracer.mark(*promise);
                tracer.mark(*source);
            }
        }
    }
}

impl VM {
    /// Allocate a pending promise.
    pub(crate) fn new_promise(&mut self) -> ObjectId {
        let proto = self.realm.protos.promise;
        self.alloc(JsObject::new(Some(proto), ObjectClass::Promise(PromiseData::new())))
    }

    fn promise_data(&self, value: &Value) -> Option<&PromiseData> {
        match &self.heap_object(value.as_object()?)?.class {
            ObjectClass::Promise(data) => Some(data),
            _ => None,
        }
    }

    fn promise_data_mut(&mut self, id: ObjectId) -> &mut PromiseData {
        match &mut self.object_mut(id).class {
            ObjectClass::Promise(data) => data,
            _ => crate::fatal!("object {} is not a promise", id),
        }
    }

    /// Resolve `promise` with `value`, adopting the state of a promise value.
    pub(crate) fn resolve_promise(&mut self, promise: ObjectId, value: Value) {
        if let Some(source) = value.as_object().filter(|_| self.promise_data(&value).is_some()) {
            if source == promise {
                let _guard = self.root_object(promise);
                let error = self.type_error("cannot resolve a promise with itself");
                if let Some(reason) = error.thrown_value() {
                    self.settle_promise(promise, PromiseState::Rejected, reason.clone());
                }
                return;
            }
            if self.promise_data(&value).map(|p| p.state) == Some(PromiseState::Pending) {
                self.promise_data_mut(source).reactions.push(Reaction::Adopt { promise });
            } else {
                self.jobs.push_back(Job::Adopt { promise, source });
            }
            return;
        }
        self.settle_promise(promise, PromiseState::Fulfilled, value);
    }

    /// Reject `promise` with `reason`.
    pub(crate) fn reject_promise(&mut self, promise: ObjectId, reason: Value) {
        self.settle_promise(promise, PromiseState::Rejected, reason);
    }

    fn settle_promise(&mut self, promise: ObjectId, state: PromiseState, result: Value) {
        let data = self.promise_data_mut(promise);
        if data.state != PromiseState::Pending {
            return;
        }
        data.state = state;
        data.result = result.clone();
        let reactions = std::mem::take(&mut data.reactions);
        let kind = match state {
            PromiseState::Rejected => GeneratorResumeKind::Throw,
            _ => GeneratorResumeKind::Next,
        };
        for reaction in reactions {
            self.jobs.push_back(match reaction {
                Reaction::ResumeAsync { generator } => Job::ResumeAsync {
                    generator,
                    kind,
                    value: result.clone(),
                },
                Reaction::Adopt { promise: target } => Job::Adopt {
                    promise: target,
                    source: promise,
                },
            });
        }
    }

    /// Arrange for `generator`, parked at `Await`, to resume once `value`
    /// settles. Non-promise values resume on the next job turn.
    pub(crate) fn await_value(&mut self, generator: ObjectId, value: Value) -> JsResult<()> {
        let job = match self.promise_data(&value) {
            Some(data) if data.state == PromiseState::Pending => {
                if let Some(source) = value.as_object() {
                    self.promise_data_mut(source)
                        .reactions
                        .push(Reaction::ResumeAsync { generator });
                }
                return Ok(());
            }
            Some(data) => Job::ResumeAsync {
                generator,
                kind: if data.state == PromiseState::Rejected {
                    GeneratorResumeKind::Throw
                } else {
                    GeneratorResumeKind::Next
                },
                value: data.result.clone(),
            },
            None => Job::ResumeAsync {
                generator,
                kind: GeneratorResumeKind::Next,
                value,
            },
        };
        self.jobs.push_back(job);
        Ok(())
    }

    fn run_job(&mut self, job: Job) -> JsResult<()> {
        match job {
            Job::Adopt { promise, source } => {
                let Some(data) = self.promise_data(&Value::Object(source)) else {
                    return Ok(());
                };
                let (state, result) = (data.state, data.result.clone());
                self.settle_promise(promise, state, result);
                Ok(())
            }
            Job::ResumeAsync { generator, kind, value } => {
                let _guard = self.root_object(generator);
                let _value = self.root(&value);
                let result = self.resume_generator(generator, kind, value);
                match self.generator(generator).kind {
                    GeneratorKind::AsyncGenerator => {
                        self.async_generator_settle(generator, result)?;
                        self.async_generator_drain(generator)
                    }
                    _ => result.map(|_| ()),
                }
            }
        }
    }

    /// Drain the job queue, returning the number of jobs run.
    pub fn run_jobs(&mut self) -> Result<usize, VmError> {
        let mut count = 0;
        while let Some(job) = self.jobs.pop_front() {
            // The job is out of the queue, so its handles need a guard.
            let _guards: Vec<_> = match &job {
                Job::ResumeAsync { generator, .. } => vec![self.root_object(*generator)],
                Job::Adopt { promise, source } => vec![self.root_object(*promise), self.root_object(*source)],
            };
            count += 1;
            if let Err(abrupt) = self.run_job(job) {
                return Err(self.to_vm_error(abrupt));
            }
        }
        log::trace!("ran {} jobs", count);
        Ok(count)
    }

    /// State and result of a promise object.
    pub fn promise_state(&self, value: &Value) -> Option<(PromiseState, Value)> {
        self.promise_data(value).map(|data| (data.state, data.result.clone()))
    }

    /// Number of queued jobs.
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }
}
