use std::collections::HashMap;

use compact_str::CompactString;
use parking_lot::Mutex;
use tracing::debug;

/// Point-in-time copy of all live (positive-count) task names and counts.
pub type Snapshot = HashMap<CompactString, i64>;

/// Concurrent registry of named counters.
///
/// Entries are created lazily on first increment and never removed: a name
/// whose count has fallen to zero or below stays in the map but is filtered
/// out of [`CounterStore::snapshot`]. The store does not validate start/done
/// pairing — an unmatched decrement simply drives the count negative.
pub struct CounterStore {
    counts: Mutex<HashMap<CompactString, i64>>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Adds one unit under `name`, creating the entry if absent.
    ///
    /// Returns the live total (sum of all positive counts) after the
    /// mutation, read under the same lock so callers never format a torn
    /// total into an event line.
    pub fn increment(&self, name: &str) -> i64 {
        let mut counts = self.counts.lock();
        *counts.entry(CompactString::from(name)).or_insert(0) += 1;
        sum_positive(&counts)
    }

    /// Removes one unit under `name`.
    ///
    /// Returns the live total after the mutation.
    pub fn decrement(&self, name: &str) -> i64 {
        let mut counts = self.counts.lock();
        let count = counts.entry(CompactString::from(name)).or_insert(0);
        *count -= 1;
        if *count < 0 {
            debug!(name, count = *count, "done without a matching start");
        }
        sum_positive(&counts)
    }

    /// Point-in-time copy of every strictly-positive entry.
    ///
    /// The map lock is released before the copy is handed to the caller.
    pub fn snapshot(&self) -> Snapshot {
        self.counts
            .lock()
            .iter()
            .filter(|&(_, &count)| count > 0)
            .map(|(name, &count)| (name.clone(), count))
            .collect()
    }

    /// Sum of all positive counts.
    pub fn live_total(&self) -> i64 {
        sum_positive(&self.counts.lock())
    }
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sum_positive(counts: &HashMap<CompactString, i64>) -> i64 {
    counts.values().filter(|&&count| count > 0).sum()
}
