//! Modulo partitioning of a record stream across independent workers
//!
//! Every worker scans the whole file with its own reader and keeps line `P`
//! (zero-based, header excluded) iff `P % count == index`. Ownership is a pure
//! function of the line index, so workers need no shared cursor or lock and the
//! union of all partitions covers every line exactly once.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    index: usize,
    count: usize,
}

impl Partition {
    pub fn new(index: usize, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::Config("worker count must be >= 1".to_string()));
        }
        if index >= count {
            return Err(Error::Config(format!(
                "worker index {index} out of range for {count} workers"
            )));
        }
        Ok(Self { index, count })
    }

    /// Single partition owning every line.
    pub fn whole() -> Self {
        Self { index: 0, count: 1 }
    }

    /// One partition per worker, indices `0..count`.
    pub fn plan(count: usize) -> Result<Vec<Self>> {
        (0..count.max(1))
            .map(|index| Self::new(index, count))
            .collect()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn owns(&self, line_index: u64) -> bool {
        line_index % self.count as u64 == self.index as u64
    }

    /// Number of lines this partition owns out of `total`.
    pub fn share_of(&self, total: u64) -> u64 {
        let count = self.count as u64;
        let index = self.index as u64;
        total / count + u64::from(total % count > index)
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}
