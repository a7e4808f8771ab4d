//! Tracing primitives shared by the heap and its clients.
//!
//! Marking is tri-colour: a slot starts white, turns gray when first reached
//! and black once its own handles have been reported. Anything still white
//! after marking is garbage.

use core_types::{ObjectId, Value};

/// Mark colors for tri-color marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MarkColor {
    /// Unmarked (not yet visited)
    #[default]
    White = 0,
    /// Reachable, children not yet scanned
    Gray = 1,
    /// Reachable, all children scanned
    Black = 2,
}

/// Implemented by everything stored in a [`Heap`](crate::Heap).
///
/// `trace` must report every object handle the value holds; a handle that is
/// not reported may be swept while still in use.
pub trait Trace {
    /// Report held handles to `tracer`.
    fn trace(&self, tracer: &mut Tracer);
}

impl Trace for Value {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_value(self);
    }
}

impl Trace for ObjectId {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark(*self);
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut Tracer) {
        if let Some(item) = self {
            item.trace(tracer);
        }
    }
}

/// Collects handles reported during marking.
///
/// The tracer only queues handles; the heap decides which of them are new.
#[derive(Debug, Default)]
pub struct Tracer {
    pending: Vec<ObjectId>,
}

impl Tracer {
    /// Create an empty tracer
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a handle
    pub fn mark(&mut self, id: ObjectId) {
        self.pending.push(id);
    }

    /// Report the handle inside `value`, if any
    pub fn mark_value(&mut self, value: &Value) {
        if let Value::Object(id) = value {
            self.pending.push(*id);
        }
    }

    /// Report every handle in `values`
    pub fn mark_values<'a>(&mut self, values: impl IntoIterator<Item = &'a Value>) {
        for value in values {
            self.mark_value(value);
        }
    }

    /// Number of handles queued and not yet consumed
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, ObjectId> {
        self.pending.drain(..)
    }
}
