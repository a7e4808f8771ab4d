//! Mark-and-sweep object heap.
//!
//! Objects live in a slot vector and are addressed by [`ObjectId`]: a slot
//! index plus the slot's generation when the handle was issued. Sweeping a
//! slot bumps its generation, so a stale handle resolves to `None` instead of
//! aliasing whatever object reuses the slot.
//!
//! Collection is driven by an allocation budget: once `threshold`
//! allocations have happened since the last collection, the next
//! [`Heap::allocate`] collects first. Callers that hold the heap inside a
//! larger structure can check [`Heap::should_collect`] themselves and feed a
//! pre-filled [`Tracer`] to [`Heap::collect_from`].

use core_types::ObjectId;

use crate::gc::{MarkColor, Trace, Tracer};

/// Allocations between collections unless configured otherwise.
pub const DEFAULT_GC_THRESHOLD: usize = 10_000;

/// Source of the root handles of a collection.
pub trait RootSource {
    /// Report every root to `tracer`.
    fn trace_roots(&self, tracer: &mut Tracer);
}

impl<F: Fn(&mut Tracer)> RootSource for F {
    fn trace_roots(&self, tracer: &mut Tracer) {
        self(tracer)
    }
}

/// Collection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of collections run
    pub collections: u64,
    /// Objects allocated since the heap was created
    pub total_allocated: u64,
    /// Objects freed since the heap was created
    pub total_freed: u64,
    /// Objects freed by the most recent collection
    pub last_freed: usize,
    /// Objects currently alive
    pub live_objects: usize,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    color: MarkColor,
    value: Option<T>,
}

/// A traced heap of `T`.
#[derive(Debug)]
pub struct Heap<T: Trace> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    threshold: usize,
    allocated_since_gc: usize,
    stats: GcStats,
}

impl<T: Trace> Heap<T> {
    /// Create a heap that collects every [`DEFAULT_GC_THRESHOLD`] allocations.
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_GC_THRESHOLD)
    }

    /// Create a heap with a custom allocation budget.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            threshold: threshold.max(1),
            allocated_since_gc: 0,
            stats: GcStats::default(),
        }
    }

    /// Change the allocation budget.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold.max(1);
    }

    /// Whether the allocation budget is used up.
    pub fn should_collect(&self) -> bool {
        self.allocated_since_gc >= self.threshold
    }

    /// Allocate `value`, collecting first if the budget is used up.
    ///
    /// `value` itself is traced as a root of that collection, so handles it
    /// holds survive even though it is not in the heap yet.
    ///
    /// # Arguments
    ///
    /// * `value` - The object to store
    /// * `roots` - Everything else that must survive a collection
    ///
    /// # Returns
    ///
    /// A handle to the stored object
    pub fn allocate(&mut self, value: T, roots: &dyn RootSource) -> ObjectId {
        if self.should_collect() {
            let mut tracer = Tracer::new();
            roots.trace_roots(&mut tracer);
            value.trace(&mut tracer);
            self.collect_from(tracer);
        }
        self.insert(value)
    }

    /// Store `value` without considering a collection.
    pub fn insert(&mut self, value: T) -> ObjectId {
        self.allocated_since_gc += 1;
        self.stats.total_allocated += 1;
        self.stats.live_objects += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.color = MarkColor::White;
            return ObjectId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            color: MarkColor::White,
            value: Some(value),
        });
        ObjectId::new(index, 0)
    }

    /// Resolve a handle; `None` if the object was collected.
    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    /// Resolve a handle mutably; `None` if the object was collected.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether the handle still refers to a live object.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.stats.live_objects
    }

    /// Whether the heap holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collection statistics so far.
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Run a full collection from `roots`, returning the number of objects freed.
    pub fn collect(&mut self, roots: &dyn RootSource) -> usize {
        let mut tracer = Tracer::new();
        roots.trace_roots(&mut tracer);
        self.collect_from(tracer)
    }

    /// Run a full collection from the handles already reported to `tracer`.
    pub fn collect_from(&mut self, mut tracer: Tracer) -> usize {
        let mut gray = Vec::new();
        for id in tracer.drain() {
            if self.shade(id) {
                gray.push(id);
            }
        }
        while let Some(id) = gray.pop() {
            let slot = &mut self.slots[id.index()];
            if let Some(value) = &slot.value {
                value.trace(&mut tracer);
            }
            slot.color = MarkColor::Black;
            for child in tracer.drain() {
                if self.shade(child) {
                    gray.push(child);
                }
            }
        }
        let freed = self.sweep();
        self.allocated_since_gc = 0;
        self.stats.collections += 1;
        self.stats.last_freed = freed;
        self.stats.total_freed += freed as u64;
        log::debug!(
            "gc #{}: freed {} objects, {} live",
            self.stats.collections,
            freed,
            self.stats.live_objects
        );
        freed
    }

    /// Turn a white live slot gray; false for stale handles and marked slots.
    fn shade(&mut self, id: ObjectId) -> bool {
        match self.slots.get_mut(id.index()) {
            Some(slot)
                if slot.generation == id.generation()
                    && slot.value.is_some()
                    && slot.color == MarkColor::White =>
            {
                slot.color = MarkColor::Gray;
                true
            }
            _ => false,
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.is_none() {
                continue;
            }
            if slot.color == MarkColor::White {
                slot.value = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                freed += 1;
            } else {
                slot.color = MarkColor::White;
            }
        }
        self.stats.live_objects -= freed;
        freed
    }
}

impl<T: Trace> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}
