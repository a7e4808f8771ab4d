//! GC integration for interpreter allocations
//!
//! Every object the interpreter creates goes through [`VM::alloc`], which may
//! run a collection first. The root set is everything the VM can still reach
//! without consulting the heap: the value stack, live frames, the realm, the
//! job queue, the pending exception and any [`Rooted`] guards handed out to
//! Rust code.

use std::collections::VecDeque;

use core_types::{ObjectId, Value};
use memory_manager::{GcStats, RootSet, RootSource, Rooted, Trace, Tracer};

use crate::call_frame::Frame;
use crate::object::JsObject;
use crate::promise_integration::Job;
use crate::realm::Realm;
use crate::vm::VM;

/// Borrowed view of everything the VM roots.
struct VmRoots<'a> {
    stack: &'a [Value],
    frames: &'a [Frame],
    realm: &'a Realm,
    roots: &'a RootSet,
    jobs: &'a VecDeque<Job>,
    pending_exception: &'a Option<Value>,
}

impl RootSource for VmRoots<'_> {
    fn trace_roots(&self, tracer: &mut Tracer) {
        tracer.mark_values(self.stack.iter());
        for frame in self.frames {
            frame.trace(tracer);
        }
        self.realm.trace(tracer);
        self.roots.trace_roots(tracer);
        for job in self.jobs {
            job.trace(tracer);
        }
        self.pending_exception.trace(tracer);
    }
}

impl VM {
    /// Store `object` in the heap, collecting first if the allocation budget
    /// is exhausted.
    ///
    /// Handles held only in Rust locals are not roots; callers keep them on
    /// the value stack or behind a [`Rooted`] guard across this call.
    pub(crate) fn alloc(&mut self, object: JsObject) -> ObjectId {
        let VM {
            heap,
            stack,
            frames,
            realm,
            roots,
            jobs,
            pending_exception,
            ..
        } = self;
        let trace_roots = VmRoots {
            stack,
            frames,
            realm,
            roots,
            jobs,
            pending_exception,
        };
        heap.allocate(object, &trace_roots)
    }

    /// Resolve a handle the interpreter knows to be live.
    pub(crate) fn object(&self, id: ObjectId) -> &JsObject {
        match self.heap.get(id) {
            Some(object) => object,
            None => crate::fatal!("stale object handle {}", id),
        }
    }

    /// Resolve a handle the interpreter knows to be live, mutably.
    pub(crate) fn object_mut(&mut self, id: ObjectId) -> &mut JsObject {
        match self.heap.get_mut(id) {
            Some(object) => object,
            None => crate::fatal!("stale object handle {}", id),
        }
    }

    /// Keep `value` alive until the guard is dropped.
    pub fn root(&self, value: &Value) -> Option<Rooted> {
        self.roots.root_value(value)
    }

    /// Keep the object `id` alive until the guard is dropped.
    pub fn root_object(&self, id: ObjectId) -> Rooted {
        self.roots.root(id)
    }

    /// Run a full collection now, returning the number of objects freed.
    pub fn collect_garbage(&mut self) -> usize {
        let VM {
            heap,
            stack,
            frames,
            realm,
            roots,
            jobs,
            pending_exception,
            ..
        } = self;
        let trace_roots = VmRoots {
            stack,
            frames,
            realm,
            roots,
            jobs,
            pending_exception,
        };
        let freed = heap.collect(&trace_roots);
        log::debug!("collected {} objects, {} live", freed, heap.len());
        freed
    }

    /// Collector statistics
    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// Whether `id` still names a live object
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.heap.contains(id)
    }

    /// Inspect a live object, for embedders and tests
    pub fn heap_object(&self, id: ObjectId) -> Option<&JsObject> {
        self.heap.get(id)
    }
}
