//! Memory accounting for query execution.
//!
//! Arrow buffers are allocated by the Arrow crates themselves; what the core
//! controls is how many bytes a query is allowed to hold at once. Every
//! operator that keeps batches or state alive takes a [`Reservation`] against
//! the caller's [`Allocator`] before doing so, which lets the caller bound
//! and observe a query's footprint.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Source of memory budget for a query.
pub trait Allocator: Send + Sync + fmt::Debug {
    /// Accounts for `bytes` more bytes, failing if the budget is exhausted.
    fn allocate(&self, bytes: usize) -> Result<()>;

    /// Returns `bytes` previously allocated.
    fn free(&self, bytes: usize);

    /// Returns the number of bytes currently allocated.
    fn allocated(&self) -> usize;
}

/// Allocator without a limit. It only keeps count.
#[derive(Debug, Default)]
pub struct DefaultAllocator {
    allocated: AtomicUsize,
}

impl DefaultAllocator {
    /// Creates a new unbounded allocator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for DefaultAllocator {
    fn allocate(&self, bytes: usize) -> Result<()> {
        self.allocated.fetch_add(bytes, Ordering::SeqCst);
        Ok(())
    }

    fn free(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::SeqCst);
    }

    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }
}

/// Allocator that refuses reservations beyond a fixed number of bytes.
#[derive(Debug)]
pub struct LimitedAllocator {
    limit: usize,
    allocated: AtomicUsize,
}

impl LimitedAllocator {
    /// Creates an allocator that allows at most `limit` bytes at once.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Returns the configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Allocator for LimitedAllocator {
    fn allocate(&self, bytes: usize) -> Result<()> {
        self.allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current
                    .checked_add(bytes)
                    .filter(|next| *next <= self.limit)
            })
            .map(|_| ())
            .map_err(|current| Error::MemoryLimitExceeded {
                requested: bytes,
                allocated: current,
                limit: self.limit,
            })
    }

    fn free(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::SeqCst);
    }

    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }
}

/// Bytes held against an allocator, returned when the reservation drops.
#[derive(Debug)]
pub struct Reservation {
    allocator: Arc<dyn Allocator>,
    size: usize,
}

impl Reservation {
    /// Creates an empty reservation.
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator, size: 0 }
    }

    /// Returns the number of bytes held.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Grows the reservation by `bytes`.
    pub fn try_grow(&mut self, bytes: usize) -> Result<()> {
        self.allocator.allocate(bytes)?;
        self.size += bytes;
        Ok(())
    }

    /// Shrinks the reservation by `bytes`, saturating at zero.
    pub fn shrink(&mut self, bytes: usize) {
        let bytes = bytes.min(self.size);
        self.allocator.free(bytes);
        self.size -= bytes;
    }

    /// Grows or shrinks the reservation to exactly `size` bytes.
    pub fn try_resize(&mut self, size: usize) -> Result<()> {
        if size > self.size {
            self.try_grow(size - self.size)
        } else {
            self.shrink(self.size - size);
            Ok(())
        }
    }

    /// Releases everything held.
    pub fn free(&mut self) {
        self.shrink(self.size);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.free();
    }
}
