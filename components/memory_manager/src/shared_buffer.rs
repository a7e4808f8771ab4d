//! Raw memory behind shared array buffers.
//!
//! A [`SharedArrayRawBuffer`] is reserved up front at its maximum size and
//! never moves, so a growable buffer can lengthen without invalidating views
//! held by other threads. Storage is a slice of `AtomicU32` words: byte reads
//! and writes are individually atomic but unordered with respect to each
//! other, which gives racing accesses defined (if unspecified) results, and
//! aligned 32-bit operations map onto the word atomics directly.
//!
//! Handles ([`SharedBufferRef`]) are counted separately from the `Arc` that
//! owns the memory. The count saturates at a limit instead of wrapping;
//! taking a handle past the limit fails with
//! [`SharedBufferError::RefcountOverflow`].

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use thiserror::Error;

/// Largest byte length a shared buffer may reserve.
pub const MAX_SHARED_BYTE_LENGTH: usize = 1 << 31;

/// Errors from shared buffer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SharedBufferError {
    /// The handle count is at its limit
    #[error("too many references to shared buffer")]
    RefcountOverflow,
    /// Requested size exceeds what may be reserved
    #[error("shared buffer of {0} bytes is too large")]
    AllocationTooLarge(usize),
    /// Access outside the current length
    #[error("index {index} out of range for shared buffer of length {length}")]
    OutOfBounds {
        /// Requested byte index
        index: usize,
        /// Current byte length
        length: usize,
    },
    /// 32-bit access at an offset that is not a multiple of 4
    #[error("misaligned 32-bit access at byte {0}")]
    Misaligned(usize),
    /// Grow beyond the reserved maximum
    #[error("cannot grow shared buffer to {requested} bytes (maximum {max})")]
    ExceedsMaximum {
        /// Requested byte length
        requested: usize,
        /// Reserved maximum
        max: usize,
    },
    /// Grow to a smaller length
    #[error("shared buffer cannot shrink from {current} to {requested} bytes")]
    ShrinkNotAllowed {
        /// Requested byte length
        requested: usize,
        /// Current byte length
        current: usize,
    },
    /// Grow on a fixed-length buffer
    #[error("shared buffer is not growable")]
    NotGrowable,
}

/// Reference-counted, thread-shareable byte storage.
#[derive(Debug)]
pub struct SharedArrayRawBuffer {
    words: Box<[AtomicU32]>,
    length: AtomicUsize,
    max_length: usize,
    growable: bool,
    refcount: AtomicU32,
    refcount_limit: u32,
    grow_lock: Mutex<()>,
}

impl SharedArrayRawBuffer {
    /// Allocate a fixed-length, zeroed buffer and return the first handle.
    pub fn allocate(length: usize) -> Result<SharedBufferRef, SharedBufferError> {
        Self::build(length, length, false, u32::MAX)
    }

    /// Allocate a growable buffer reserving `max_length` bytes.
    pub fn allocate_growable(
        length: usize,
        max_length: usize,
    ) -> Result<SharedBufferRef, SharedBufferError> {
        if length > max_length {
            return Err(SharedBufferError::ExceedsMaximum {
                requested: length,
                max: max_length,
            });
        }
        Self::build(length, max_length, true, u32::MAX)
    }

    /// Allocate a fixed-length buffer whose handle count saturates at `limit`.
    pub fn allocate_with_refcount_limit(
        length: usize,
        limit: u32,
    ) -> Result<SharedBufferRef, SharedBufferError> {
        Self::build(length, length, false, limit.max(1))
    }

    fn build(
        length: usize,
        max_length: usize,
        growable: bool,
        refcount_limit: u32,
    ) -> Result<SharedBufferRef, SharedBufferError> {
        if max_length > MAX_SHARED_BYTE_LENGTH {
            return Err(SharedBufferError::AllocationTooLarge(max_length));
        }
        let words: Box<[AtomicU32]> = (0..max_length.div_ceil(4))
            .map(|_| AtomicU32::new(0))
            .collect();
        log::trace!(
            "allocated shared buffer: length {}, reserved {}",
            length,
            max_length
        );
        let raw = Arc::new(SharedArrayRawBuffer {
            words,
            length: AtomicUsize::new(length),
            max_length,
            growable,
            refcount: AtomicU32::new(1),
            refcount_limit,
            grow_lock: Mutex::new(()),
        });
        Ok(SharedBufferRef { raw })
    }

    fn add_reference(&self) -> Result<(), SharedBufferError> {
        let backoff = Backoff::new();
        let mut current = self.refcount.load(Ordering::Relaxed);
        loop {
            if current >= self.refcount_limit {
                return Err(SharedBufferError::RefcountOverflow);
            }
            match self.refcount.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => {
                    current = actual;
                    backoff.spin();
                }
            }
        }
    }

    fn drop_reference(&self) {
        let previous = self.refcount.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            log::trace!("last handle to shared buffer released");
        }
    }

    fn check_index(&self, index: usize, width: usize) -> Result<(), SharedBufferError> {
        let length = self.length.load(Ordering::SeqCst);
        if index.checked_add(width).map_or(true, |end| end > length) {
            return Err(SharedBufferError::OutOfBounds { index, length });
        }
        Ok(())
    }

    fn word(&self, byte_index: usize) -> Result<&AtomicU32, SharedBufferError> {
        self.check_index(byte_index, 4)?;
        if byte_index % 4 != 0 {
            return Err(SharedBufferError::Misaligned(byte_index));
        }
        Ok(&self.words[byte_index / 4])
    }
}

/// A counted handle to a [`SharedArrayRawBuffer`].
#[derive(Debug)]
pub struct SharedBufferRef {
    raw: Arc<SharedArrayRawBuffer>,
}

impl SharedBufferRef {
    /// Take another handle, failing if the count is at its limit.
    pub fn try_clone(&self) -> Result<SharedBufferRef, SharedBufferError> {
        self.raw.add_reference()?;
        Ok(SharedBufferRef {
            raw: Arc::clone(&self.raw),
        })
    }

    /// Number of live handles
    pub fn refcount(&self) -> u32 {
        self.raw.refcount.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same memory
    pub fn same_buffer(&self, other: &SharedBufferRef) -> bool {
        Arc::ptr_eq(&self.raw, &other.raw)
    }

    /// Current byte length
    pub fn byte_length(&self) -> usize {
        self.raw.length.load(Ordering::SeqCst)
    }

    /// Reserved maximum byte length
    pub fn max_byte_length(&self) -> usize {
        self.raw.max_length
    }

    /// Whether the buffer may grow
    pub fn is_growable(&self) -> bool {
        self.raw.growable
    }

    /// Lengthen the buffer. Growth is serialized; the new bytes are zero.
    pub fn grow(&self, new_length: usize) -> Result<(), SharedBufferError> {
        let raw = &*self.raw;
        if !raw.growable {
            return Err(SharedBufferError::NotGrowable);
        }
        let _guard = raw.grow_lock.lock();
        let current = raw.length.load(Ordering::SeqCst);
        if new_length < current {
            return Err(SharedBufferError::ShrinkNotAllowed {
                requested: new_length,
                current,
            });
        }
        if new_length > raw.max_length {
            return Err(SharedBufferError::ExceedsMaximum {
                requested: new_length,
                max: raw.max_length,
            });
        }
        raw.length.store(new_length, Ordering::SeqCst);
        log::debug!("shared buffer grew from {} to {} bytes", current, new_length);
        Ok(())
    }

    /// Read one byte.
    pub fn load_u8(&self, index: usize) -> Result<u8, SharedBufferError> {
        self.raw.check_index(index, 1)?;
        let word = self.raw.words[index / 4].load(Ordering::Relaxed);
        Ok((word >> ((index % 4) * 8)) as u8)
    }

    /// Write one byte.
    pub fn store_u8(&self, index: usize, value: u8) -> Result<(), SharedBufferError> {
        self.raw.check_index(index, 1)?;
        let shift = (index % 4) * 8;
        let mask = !(0xffu32 << shift);
        let byte = u32::from(value) << shift;
        // The closure always returns Some, so the update cannot fail.
        let _ = self.raw.words[index / 4].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |w| {
            Some((w & mask) | byte)
        });
        Ok(())
    }

    /// Copy `len` bytes starting at `offset` out of the buffer.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, SharedBufferError> {
        self.raw.check_index(offset, len)?;
        (offset..offset + len).map(|i| self.load_u8(i)).collect()
    }

    /// Copy `bytes` into the buffer starting at `offset`.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<(), SharedBufferError> {
        self.raw.check_index(offset, bytes.len())?;
        for (i, byte) in bytes.iter().enumerate() {
            self.store_u8(offset + i, *byte)?;
        }
        Ok(())
    }

    /// Sequentially consistent 32-bit load at a 4-aligned byte offset.
    pub fn atomic_load(&self, index: usize) -> Result<u32, SharedBufferError> {
        Ok(self.raw.word(index)?.load(Ordering::SeqCst))
    }

    /// Sequentially consistent 32-bit store.
    pub fn atomic_store(&self, index: usize, value: u32) -> Result<(), SharedBufferError> {
        self.raw.word(index)?.store(value, Ordering::SeqCst);
        Ok(())
    }

    /// Swap in `value`, returning the previous word.
    pub fn atomic_exchange(&self, index: usize, value: u32) -> Result<u32, SharedBufferError> {
        Ok(self.raw.word(index)?.swap(value, Ordering::SeqCst))
    }

    /// Compare-and-exchange; returns the word observed before the operation.
    pub fn atomic_compare_exchange(
        &self,
        index: usize,
        expected: u32,
        replacement: u32,
    ) -> Result<u32, SharedBufferError> {
        let word = self.raw.word(index)?;
        Ok(
            match word.compare_exchange(expected, replacement, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(old) | Err(old) => old,
            },
        )
    }

    /// Wrapping add, returning the previous word.
    pub fn atomic_add(&self, index: usize, value: u32) -> Result<u32, SharedBufferError> {
        Ok(self.raw.word(index)?.fetch_add(value, Ordering::SeqCst))
    }

    /// Wrapping subtract, returning the previous word.
    pub fn atomic_sub(&self, index: usize, value: u32) -> Result<u32, SharedBufferError> {
        Ok(self.raw.word(index)?.fetch_sub(value, Ordering::SeqCst))
    }

    /// Bitwise and, returning the previous word.
    pub fn atomic_and(&self, index: usize, value: u32) -> Result<u32, SharedBufferError> {
        Ok(self.raw.word(index)?.fetch_and(value, Ordering::SeqCst))
    }

    /// Bitwise or, returning the previous word.
    pub fn atomic_or(&self, index: usize, value: u32) -> Result<u32, SharedBufferError> {
        Ok(self.raw.word(index)?.fetch_or(value, Ordering::SeqCst))
    }

    /// Bitwise xor, returning the previous word.
    pub fn atomic_xor(&self, index: usize, value: u32) -> Result<u32, SharedBufferError> {
        Ok(self.raw.word(index)?.fetch_xor(value, Ordering::SeqCst))
    }
}

impl Drop for SharedBufferRef {
    fn drop(&mut self) {
        self.raw.drop_reference();
    }
}
