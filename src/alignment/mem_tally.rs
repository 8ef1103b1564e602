//! Memory-category accounting for DP working buffers.
//!
//! Every allocation made for the striped matrix, the mask table and the
//! query profile is tallied under a category so the outer aligner can report
//! where alignment memory went. The tally is injected (`Arc<MemTally>`)
//! rather than being a process-wide singleton, so tests can substitute a
//! local instance.

use std::sync::atomic::{AtomicU64, Ordering};

/// Categories tracked by [`MemTally`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemCategory {
    /// Striped E/F/H/TMP vector storage.
    DpVector = 0,
    /// Per-cell backtrace mask words.
    DpMask = 1,
    /// Striped query-profile vectors.
    QueryProfile = 2,
    /// Anything else.
    Misc = 3,
}

const NUM_CATEGORIES: usize = 4;

/// Additive byte counters, one per [`MemCategory`].
///
/// Counters are atomics so a tally may be shared between threads that each
/// own their private DP buffers.
#[derive(Debug, Default)]
pub struct MemTally {
    bytes: [AtomicU64; NUM_CATEGORIES],
}

impl MemTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an allocation of `bytes` under `cat`.
    pub fn add(&self, cat: MemCategory, bytes: usize) {
        self.bytes[cat as usize].fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a release of `bytes` under `cat`.
    pub fn del(&self, cat: MemCategory, bytes: usize) {
        let prev = self.bytes[cat as usize].fetch_sub(bytes as u64, Ordering::Relaxed);
        debug_assert!(prev >= bytes as u64, "mem tally underflow in {cat:?}");
    }

    /// Bytes currently tallied under `cat`.
    pub fn bytes(&self, cat: MemCategory) -> u64 {
        self.bytes[cat as usize].load(Ordering::Relaxed)
    }

    /// Bytes currently tallied across all categories.
    pub fn total(&self) -> u64 {
        self.bytes
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_del_balance() {
        let tally = MemTally::new();
        tally.add(MemCategory::DpVector, 4096);
        tally.add(MemCategory::DpMask, 512);
        assert_eq!(tally.bytes(MemCategory::DpVector), 4096);
        assert_eq!(tally.total(), 4608);
        tally.del(MemCategory::DpVector, 4096);
        tally.del(MemCategory::DpMask, 512);
        assert_eq!(tally.total(), 0);
    }
}
