//! Contract tests for the memory_manager public API.

use core_types::{ObjectId, Value};
use memory_manager::{
    Heap, RootSet, SharedArrayRawBuffer, SharedBufferError, Trace, Tracer, DEFAULT_GC_THRESHOLD,
};

struct Cell {
    slots: Vec<Value>,
}

impl Trace for Cell {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_values(&self.slots);
    }
}

/// Test Heap contract: default budget and handle resolution
#[test]
fn contract_heap_resolves_live_handles() {
    let mut heap: Heap<Cell> = Heap::new();
    let id = heap.insert(Cell { slots: vec![] });
    assert!(heap.get(id).is_some());
    assert_eq!(heap.len(), 1);
    assert!(!heap.should_collect());
    assert!(DEFAULT_GC_THRESHOLD > 1);
}

/// Test Heap contract: host roots and heap edges together decide liveness
#[test]
fn contract_roots_and_edges() {
    let roots = RootSet::new();
    let mut heap = Heap::new();
    let child = heap.insert(Cell { slots: vec![] });
    let parent = heap.insert(Cell {
        slots: vec![Value::Object(child)],
    });
    let orphan = heap.insert(Cell { slots: vec![] });
    let _guard = roots.root(parent);

    let freed = heap.collect(&roots);

    assert_eq!(freed, 1);
    assert!(heap.contains(parent));
    assert!(heap.contains(child));
    assert!(!heap.contains(orphan));
}

/// Test Heap contract: a handle forged with a wrong generation resolves to nothing
#[test]
fn contract_heap_rejects_wrong_generation() {
    let mut heap = Heap::new();
    let id = heap.insert(Cell { slots: vec![] });
    let forged = ObjectId::new(id.index() as u32, id.generation() + 1);
    assert!(heap.get(forged).is_none());
}

/// Test shared buffer contract: concurrent atomic adds are not lost
#[test]
fn contract_shared_buffer_concurrent_add() {
    let _ = env_logger::builder().is_test(true).try_init();
    let buf = SharedArrayRawBuffer::allocate(4).unwrap();
    let handles: Vec<_> = (0..4).map(|_| buf.try_clone().unwrap()).collect();
    assert_eq!(buf.refcount(), 5);

    crossbeam::scope(|s| {
        for handle in &handles {
            s.spawn(move |_| {
                for _ in 0..1000 {
                    handle.atomic_add(0, 1).unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(buf.atomic_load(0).unwrap(), 4000);
    drop(handles);
    assert_eq!(buf.refcount(), 1);
}

/// Test shared buffer contract: racing byte writes to one word never tear
/// neighbouring bytes
#[test]
fn contract_shared_buffer_racy_bytes_stay_independent() {
    let buf = SharedArrayRawBuffer::allocate(4).unwrap();
    crossbeam::scope(|s| {
        for lane in 0..4usize {
            let handle = buf.try_clone().unwrap();
            s.spawn(move |_| {
                for round in 0..200u32 {
                    handle.store_u8(lane, (round % 256) as u8 ^ lane as u8).unwrap();
                }
                handle.store_u8(lane, 0x10 + lane as u8).unwrap();
            });
        }
    })
    .unwrap();
    assert_eq!(buf.read_bytes(0, 4).unwrap(), vec![0x10, 0x11, 0x12, 0x13]);
}

/// Test shared buffer contract: growth is visible to every handle
#[test]
fn contract_shared_buffer_growth_is_shared() {
    let a = SharedArrayRawBuffer::allocate_growable(0, 8).unwrap();
    let b = a.try_clone().unwrap();
    assert!(a.same_buffer(&b));
    assert_eq!(
        b.load_u8(0),
        Err(SharedBufferError::OutOfBounds { index: 0, length: 0 })
    );
    a.grow(8).unwrap();
    b.store_u8(7, 9).unwrap();
    assert_eq!(a.load_u8(7).unwrap(), 9);
    assert_eq!(b.max_byte_length(), 8);
}
