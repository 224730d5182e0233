//! Bounded batch accumulator

use crate::{Error, Result};

/// Records per flush unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Collects up to `capacity` items between flushes.
///
/// The caller flushes whenever [`Batch::is_full`] turns true, and once more on
/// source exhaustion if anything is left; a partial final batch is never
/// dropped by the accumulator itself.
#[derive(Debug)]
pub struct Batch<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> Batch<T> {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("batch size must be >= 1".to_string()));
        }
        Ok(Self {
            items: Vec::with_capacity(capacity),
            capacity,
        })
    }

    pub fn push(&mut self, item: T) {
        debug_assert!(self.items.len() < self.capacity, "push into a full batch");
        self.items.push(item);
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hands out the accumulated items and leaves fresh, empty storage behind.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity))
    }
}
