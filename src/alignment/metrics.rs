//! Counters for the striped fill and backtrace.
//!
//! Each worker thread owns an [`AlignMetrics`] and accumulates lock-free;
//! totals are folded into a [`SharedAlignMetrics`] parent under its mutex
//! when the thread finishes a batch.

use std::sync::Mutex;

/// Additive counter bundle for one thread's DP work.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlignMetrics {
    /// DPs tried.
    pub dp: u64,
    /// DPs that saturated the 8-bit fill.
    pub dpsat: u64,
    /// DPs failed.
    pub dpfail: u64,
    /// DPs succeeded.
    pub dpsucc: u64,
    /// DP columns filled.
    pub col: u64,
    /// DP cells filled.
    pub cell: u64,
    /// DP inner-loop iterations.
    pub inner: u64,
    /// DP fixup-loop iterations.
    pub fixup: u64,
    /// Backtrace candidate cells examined by the gather pass.
    pub gathcell: u64,
    /// Backtrace candidate solution cells found.
    pub gathsol: u64,
    /// Backtraces attempted.
    pub bt: u64,
    /// Backtraces failed.
    pub btfail: u64,
    /// Backtraces succeeded.
    pub btsucc: u64,
    /// Backtrace cells traversed.
    pub btcell: u64,
    /// Backtraces rejected for crossing an already-reported core cell.
    pub corerej: u64,
    /// Backtraces rejected for exceeding the N ceiling.
    pub nrej: u64,
}

impl AlignMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Field-wise add of another bundle.
    pub fn merge(&mut self, o: &AlignMetrics) {
        self.dp += o.dp;
        self.dpsat += o.dpsat;
        self.dpfail += o.dpfail;
        self.dpsucc += o.dpsucc;
        self.col += o.col;
        self.cell += o.cell;
        self.inner += o.inner;
        self.fixup += o.fixup;
        self.gathcell += o.gathcell;
        self.gathsol += o.gathsol;
        self.bt += o.bt;
        self.btfail += o.btfail;
        self.btsucc += o.btsucc;
        self.btcell += o.btcell;
        self.corerej += o.corerej;
        self.nrej += o.nrej;
    }

    /// Fold this bundle into a shared parent under the parent's lock.
    pub fn merge_into(&self, parent: &SharedAlignMetrics) {
        parent.merge_from(self);
    }
}

/// Mutex-guarded parent bundle shared between threads.
#[derive(Debug, Default)]
pub struct SharedAlignMetrics {
    inner: Mutex<AlignMetrics>,
}

impl SharedAlignMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a thread-local bundle into the shared totals.
    pub fn merge_from(&self, local: &AlignMetrics) {
        self.inner
            .lock()
            .expect("metrics mutex poisoned")
            .merge(local);
    }

    /// Copy of the current totals.
    pub fn snapshot(&self) -> AlignMetrics {
        *self.inner.lock().expect("metrics mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_field_wise() {
        let mut a = AlignMetrics::new();
        a.dp = 3;
        a.btcell = 10;
        let mut b = AlignMetrics::new();
        b.dp = 2;
        b.nrej = 1;
        a.merge(&b);
        assert_eq!(a.dp, 5);
        assert_eq!(a.btcell, 10);
        assert_eq!(a.nrej, 1);
    }

    #[test]
    fn reset_zeroes() {
        let mut a = AlignMetrics::new();
        a.cell = 99;
        a.reset();
        assert_eq!(a, AlignMetrics::default());
    }

    #[test]
    fn shared_parent_accumulates_across_threads() {
        use std::sync::Arc;
        let parent = Arc::new(SharedAlignMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let parent = Arc::clone(&parent);
            handles.push(std::thread::spawn(move || {
                let mut local = AlignMetrics::new();
                local.dp = 10;
                local.btsucc = 7;
                local.merge_into(&parent);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let total = parent.snapshot();
        assert_eq!(total.dp, 40);
        assert_eq!(total.btsucc, 28);
    }
}
