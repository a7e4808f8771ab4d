//! Host-held roots.
//!
//! Values reachable only from host code (a native holding an object across an
//! allocation, an embedder keeping a result around) are invisible to the
//! tracer. Registering them in a [`RootSet`] keeps them alive until the
//! returned [`Rooted`] guard is dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use core_types::{ObjectId, Value};

use crate::gc::Tracer;
use crate::heap::RootSource;

#[derive(Debug, Default)]
struct RootTable {
    entries: Vec<Option<ObjectId>>,
    free: Vec<usize>,
    live: usize,
}

/// Table of host-held roots, shared between the owner and its guards.
#[derive(Debug, Default, Clone)]
pub struct RootSet {
    table: Rc<RefCell<RootTable>>,
}

impl RootSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `id` alive until the returned guard is dropped
    pub fn root(&self, id: ObjectId) -> Rooted {
        let mut table = self.table.borrow_mut();
        let slot = match table.free.pop() {
            Some(slot) => {
                table.entries[slot] = Some(id);
                slot
            }
            None => {
                table.entries.push(Some(id));
                table.entries.len() - 1
            }
        };
        table.live += 1;
        Rooted {
            table: Rc::clone(&self.table),
            slot,
            id,
        }
    }

    /// Root the object in `value`, if it holds one
    pub fn root_value(&self, value: &Value) -> Option<Rooted> {
        value.as_object().map(|id| self.root(id))
    }

    /// Number of live guards
    pub fn len(&self) -> usize {
        self.table.borrow().live
    }

    /// Whether no guard is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RootSource for RootSet {
    fn trace_roots(&self, tracer: &mut Tracer) {
        for id in self.table.borrow().entries.iter().flatten() {
            tracer.mark(*id);
        }
    }
}

/// RAII guard for one root; unregisters itself on drop.
pub struct Rooted {
    table: Rc<RefCell<RootTable>>,
    slot: usize,
    id: ObjectId,
}

impl Rooted {
    /// The rooted handle
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The rooted handle as a value
    pub fn value(&self) -> Value {
        Value::Object(self.id)
    }
}

impl fmt::Debug for Rooted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rooted").field(&self.id).finish()
    }
}

impl Drop for Rooted {
    fn drop(&mut self) {
        let mut table = self.table.borrow_mut();
        table.entries[self.slot] = None;
        table.free.push(self.slot);
        table.live -= 1;
    }
}
