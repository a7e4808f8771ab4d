//! Memory Manager - traced heap and shared memory for the interpreter
//!
//! This component provides:
//! - A mark-and-sweep [`Heap`] of engine objects addressed by [`ObjectId`]
//!   handles, with generation checks that catch stale handles
//! - The [`Trace`] trait and [`Tracer`] through which objects report the
//!   handles they hold
//! - [`RootSet`] and [`Rooted`] RAII guards that keep host-held objects alive
//!   across allocations
//! - [`SharedArrayRawBuffer`], the reference-counted memory behind shared
//!   array buffers, safe to touch from several threads at once
//!
//! [`ObjectId`]: core_types::ObjectId

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod gc;
pub mod heap;
pub mod roots;
pub mod shared_buffer;

pub use gc::{MarkColor, Trace, Tracer};
pub use heap::{GcStats, Heap, RootSource, DEFAULT_GC_THRESHOLD};
pub use roots::{RootSet, Rooted};
pub use shared_buffer::{
    SharedArrayRawBuffer, SharedBufferError, SharedBufferRef, MAX_SHARED_BYTE_LENGTH,
};
