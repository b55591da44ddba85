//! Block-range batching.
//!
//! Providers cap the span of a single `eth_getLogs` call, so every scan is
//! split into bounded, contiguous sub-ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An inclusive span of block numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks in the range.
    pub fn block_count(&self) -> u64 {
        self.to.saturating_sub(self.from).saturating_add(1)
    }

    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.to
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Split `[from, to]` into ordered, contiguous sub-ranges of at most
/// `max_batch_size` blocks each.
///
/// `from > to` yields an empty vector; a `max_batch_size` of zero is treated
/// as one.
pub fn split_range(from: u64, to: u64, max_batch_size: u64) -> Vec<BlockRange> {
    RangeBatcher::new(from, to, max_batch_size).collect()
}

/// Lazy iterator behind [`split_range`].
#[derive(Debug, Clone)]
pub struct RangeBatcher {
    next: Option<u64>,
    to: u64,
    step: u64,
}

impl RangeBatcher {
    pub fn new(from: u64, to: u64, max_batch_size: u64) -> Self {
        Self {
            next: (from <= to).then_some(from),
            to,
            step: max_batch_size.max(1),
        }
    }
}

impl Iterator for RangeBatcher {
    type Item = BlockRange;

    fn next(&mut self) -> Option<BlockRange> {
        let start = self.next?;
        let end = start.saturating_add(self.step - 1).min(self.to);
        self.next = if end >= self.to { None } else { Some(end + 1) };
        Some(BlockRange::new(start, end))
    }
}
