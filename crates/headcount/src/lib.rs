//! Live-population tracking for named concurrent work units.
//!
//! `headcount` answers "how many of what kind of task is running right now?"
//! without asking callers to keep their own books. Callers bracket each unit
//! of work with [`Tracker::start`] and [`Tracker::done`]; a background
//! reporter emits a summary line at a fixed interval, and every event
//! produces its own line. Reporting is best-effort by design: the report
//! channel is bounded and a full buffer drops lines instead of
//! backpressuring the instrumented code.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use headcount::Tracker;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let tracker = Tracker::new(Duration::from_millis(100));
//! let mut reports = tracker.reports().expect("first claim of the stream");
//!
//! let worker = {
//!     let tracker = tracker.clone();
//!     tokio::spawn(async move {
//!         tracker.start("indexer");
//!         // ... the actual work ...
//!         tracker.done("indexer");
//!     })
//! };
//!
//! worker.await.unwrap();
//! tracker.stop().await;
//! while let Some(line) = reports.recv().await {
//!     println!("{line}");
//! }
//! # }
//! ```
//!
//! The tracker never decides what runs or when; it is an observability
//! side-channel only. Unbalanced `done` calls are tolerated (the count goes
//! negative internally and disappears from snapshots), stopped trackers turn
//! `start`/`done` into no-ops, and [`Tracker::stop`] is idempotent under
//! arbitrary concurrent callers.

pub mod report;
mod store;
mod tracker;

pub use store::{CounterStore, Snapshot};
pub use tracker::{Config, DEFAULT_CHANNEL_CAPACITY, ReportStream, Tracker};
