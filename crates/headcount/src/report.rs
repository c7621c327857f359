//! Pure report-line formatting.
//!
//! The literal line grammar is part of the tracker's external contract:
//! downstream consumers may parse these lines. Names are always listed in
//! lexicographic order, so equal counts still render deterministically.

use crate::store::Snapshot;

/// Marker for a unit starting.
pub const START_MARKER: &str = "▶";
/// Marker for a unit finishing.
pub const DONE_MARKER: &str = "■";
/// Marker for a periodic summary.
pub const SUMMARY_MARKER: &str = "≡";

/// `[T=<total>] ▶ <name>` — one unit of `name` started; `total` is the sum
/// of all positive counts at the moment of the event.
pub fn start_line(total: i64, name: &str) -> String {
    format!("[T={total}] {START_MARKER} {name}")
}

/// `[T=<total>] ■ <name>` — one unit of `name` finished.
pub fn done_line(total: i64, name: &str) -> String {
    format!("[T={total}] {DONE_MARKER} {name}")
}

/// `[T=<total>] ≡ <name1>:<count1> <name2>:<count2> ...` with names sorted
/// lexicographically ascending, or `[T=0] ≡ (empty)` when nothing is live.
pub fn summary_line(snapshot: &Snapshot) -> String {
    if snapshot.is_empty() {
        return format!("[T=0] {SUMMARY_MARKER} (empty)");
    }
    let total: i64 = snapshot.values().sum();
    format!("[T={total}] {SUMMARY_MARKER} {}", sorted_entries(snapshot))
}

/// `[STOP] Remaining tasks: <name1>:<count1> ...` (sorted), or `None` when
/// the final snapshot is empty.
pub fn stop_line(snapshot: &Snapshot) -> Option<String> {
    if snapshot.is_empty() {
        return None;
    }
    Some(format!("[STOP] Remaining tasks: {}", sorted_entries(snapshot)))
}

fn sorted_entries(snapshot: &Snapshot) -> String {
    let mut entries: Vec<_> = snapshot.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .iter()
        .map(|(name, count)| format!("{name}:{count}"))
        .collect::<Vec<_>>()
        .join(" ")
}
