//! The tracker: start/done accounting, the periodic reporter task, and the
//! once-guarded shutdown protocol for the report stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::report;
use crate::store::{CounterStore, Snapshot};

/// Default capacity of the report channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Tracker construction parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Period between summary reports.
    pub report_interval: Duration,
    /// Report channel capacity; a full channel drops new lines.
    pub channel_capacity: usize,
    /// Stop the tracker when a periodic snapshot finds no live work.
    ///
    /// Off by default: an empty tick between two bursts of work would
    /// otherwise shut the tracker down mid-session.
    pub auto_stop_on_empty: bool,
}

impl Config {
    /// Configuration with the given report interval and defaults for the
    /// rest.
    pub fn new(report_interval: Duration) -> Self {
        Self {
            report_interval,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            auto_stop_on_empty: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

struct Inner {
    store: CounterStore,
    /// The only sender. Taken (and dropped) by the reporter's exit path,
    /// which is what closes the stream; `None` means shutdown is underway.
    line_tx: Mutex<Option<mpsc::Sender<String>>>,
    /// Receiver handed out once by [`Tracker::reports`].
    line_rx: Mutex<Option<mpsc::Receiver<String>>>,
    /// Wakes the reporter loop out of its tick wait.
    shutdown: Notify,
    /// Once-guard: the first swap to `true` wins the right to shut down.
    stopping: AtomicBool,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Best-effort send: a full channel drops the line, a closed channel
    /// (or one already released by shutdown) ignores it.
    fn send_line(&self, line: String) {
        let tx = self.line_tx.lock();
        let Some(tx) = tx.as_ref() else { return };
        match tx.try_send(line) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(line)) => {
                trace!(line = %line, "report channel full, dropping line");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Tracks the live population of named concurrent work units and emits
/// textual reports: one line per start/done event, plus a periodic summary.
///
/// Cheap to clone; all clones share one tracker. Constructing a tracker
/// spawns the background reporter immediately, so it must happen inside a
/// Tokio runtime.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

impl Tracker {
    /// Creates a tracker with default configuration and starts background
    /// reporting immediately.
    pub fn new(report_interval: Duration) -> Self {
        Self::with_config(Config::new(report_interval))
    }

    /// Creates a tracker with explicit configuration.
    pub fn with_config(config: Config) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let inner = Arc::new(Inner {
            store: CounterStore::new(),
            line_tx: Mutex::new(Some(tx)),
            line_rx: Mutex::new(Some(rx)),
            shutdown: Notify::new(),
            stopping: AtomicBool::new(false),
            reporter: Mutex::new(None),
        });
        debug!(
            interval_ms = config.report_interval.as_millis() as u64,
            auto_stop_on_empty = config.auto_stop_on_empty,
            "tracker started"
        );
        let handle = tokio::spawn(run_reporter(Arc::clone(&inner), config));
        *inner.reporter.lock() = Some(handle);
        Self { inner }
    }

    /// Registers one live unit under `name`. No-op after the tracker
    /// stopped.
    pub fn start(&self, name: &str) {
        if self.inner.stopping.load(Ordering::Acquire) {
            return;
        }
        let total = self.inner.store.increment(name);
        self.inner.send_line(report::start_line(total, name));
    }

    /// Deregisters one live unit under `name`. No-op after the tracker
    /// stopped.
    pub fn done(&self, name: &str) {
        if self.inner.stopping.load(Ordering::Acquire) {
            return;
        }
        let total = self.inner.store.decrement(name);
        self.inner.send_line(report::done_line(total, name));
    }

    /// Point-in-time copy of the current positive counts.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.store.snapshot()
    }

    /// Claims the report stream.
    ///
    /// The stream is single-consumer: the first call returns it, every
    /// later call returns `None`.
    pub fn reports(&self) -> Option<ReportStream> {
        self.inner
            .line_rx
            .lock()
            .take()
            .map(|rx| ReportStream { rx })
    }

    /// True once shutdown has begun.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    /// Stops the tracker: halts the periodic reporter, emits the
    /// stop-report sequence, and closes the report stream.
    ///
    /// Idempotent and safe to call from any task, including concurrently:
    /// the first caller performs the shutdown and waits for the reporter
    /// task to finish; every other call returns immediately.
    pub async fn stop(&self) {
        if self.inner.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.notify_one();
        let handle = self.inner.reporter.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!("tracker stopped");
    }
}

/// Consumer end of the report stream.
#[derive(Debug)]
pub struct ReportStream {
    rx: mpsc::Receiver<String>,
}

impl ReportStream {
    /// Receives the next report line, or `None` once the tracker has
    /// stopped and all buffered lines have been drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

async fn run_reporter(inner: Arc<Inner>, config: Config) {
    let mut ticker = tokio::time::interval(config.report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval resolves immediately; the first
    // summary belongs one full period after construction.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.notified() => break,
            _ = ticker.tick() => {
                let snapshot = inner.store.snapshot();
                if snapshot.is_empty() && config.auto_stop_on_empty {
                    if !inner.stopping.swap(true, Ordering::AcqRel) {
                        debug!("no live tasks, auto-stopping tracker");
                    }
                    break;
                }
                inner.send_line(report::summary_line(&snapshot));
            }
        }
    }

    // Stop-report sequence. This task is the only emitter and leaves the
    // loop exactly once, whether shutdown came from `stop()` or from
    // auto-stop-on-empty.
    let snapshot = inner.store.snapshot();
    if let Some(line) = report::stop_line(&snapshot) {
        inner.send_line(line);
    }
    inner.send_line(report::summary_line(&snapshot));

    // Dropping the only sender closes the stream once buffered lines drain.
    inner.line_tx.lock().take();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn drain(reports: &mut ReportStream) -> Vec<String> {
        let mut lines = Vec::new();
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(line) = reports.recv().await {
                lines.push(line);
            }
        })
        .await;
        drained.expect("report stream must terminate after stop");
        lines
    }

    #[tokio::test(flavor = "current_thread")]
    async fn counts_follow_start_done_pairs() {
        let tracker = Tracker::new(Duration::from_millis(50));

        tracker.start("foo");
        tracker.start("bar");
        tracker.start("foo");
        let snap = tracker.snapshot();
        assert_eq!(snap.get("foo"), Some(&2));
        assert_eq!(snap.get("bar"), Some(&1));

        tracker.done("foo");
        assert_eq!(tracker.snapshot().get("foo"), Some(&1));

        tracker.done("foo");
        tracker.done("bar");
        assert!(tracker.snapshot().is_empty());

        tracker.stop().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn event_lines_carry_live_totals_in_order() {
        let tracker = Tracker::new(Duration::from_secs(60));
        tracker.start("a");
        tracker.start("b");
        tracker.done("a");
        tracker.stop().await;

        let mut reports = tracker.reports().expect("stream claimed once");
        let lines = drain(&mut reports).await;
        assert_eq!(
            lines,
            vec![
                "[T=1] ▶ a",
                "[T=2] ▶ b",
                "[T=1] ■ a",
                "[STOP] Remaining tasks: b:1",
                "[T=1] ≡ b:1",
            ]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stop_without_any_work_emits_one_empty_summary() {
        let tracker = Tracker::new(Duration::from_secs(60));
        tracker.stop().await;

        let mut reports = tracker.reports().expect("stream claimed once");
        let lines = drain(&mut reports).await;
        assert_eq!(lines, vec!["[T=0] ≡ (empty)"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_balanced_pairs_leave_empty_snapshot() {
        let tracker = Tracker::new(Duration::from_millis(10));

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let name = format!("worker-{}", worker % 2);
                    for _ in 0..100 {
                        tracker.start(&name);
                        tokio::task::yield_now().await;
                        tracker.done(&name);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.expect("worker task panicked");
        }

        assert!(
            tracker.snapshot().is_empty(),
            "expected balanced pairs to cancel out, got {:?}",
            tracker.snapshot()
        );
        tracker.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_is_idempotent_under_concurrent_calls() {
        let tracker = Tracker::new(Duration::from_millis(10));
        tracker.start("task-1");

        let stops: Vec<_> = (0..100)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.stop().await })
            })
            .collect();
        for stop in stops {
            stop.await.expect("stop task panicked");
        }
        tracker.stop().await;
        tracker.stop().await;

        let mut reports = tracker.reports().expect("stream claimed once");
        let lines = drain(&mut reports).await;
        let stop_lines = lines.iter().filter(|l| l.starts_with("[STOP]")).count();
        assert_eq!(stop_lines, 1, "stop-report sequence must run exactly once");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn post_stop_calls_are_noops() {
        let tracker = Tracker::new(Duration::from_millis(10));
        tracker.start("before");
        tracker.stop().await;
        assert!(tracker.is_stopped());

        tracker.start("after");
        tracker.done("after");
        tracker.done("before");
        let snap = tracker.snapshot();
        assert_eq!(
            snap.get("before"),
            Some(&1),
            "post-stop calls must not alter the snapshot"
        );
        assert_eq!(snap.get("after"), None);

        let mut reports = tracker.reports().expect("stream claimed once");
        let lines = drain(&mut reports).await;
        assert!(
            !lines.iter().any(|l| l.contains("after")),
            "post-stop events must not reach the stream: {lines:?}"
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unmatched_starts_still_produce_reports_before_close() {
        let tracker = Tracker::new(Duration::from_secs(60));
        for i in 0..1000 {
            tracker.start(&format!("task-{i}"));
        }
        tracker.stop().await;

        let mut reports = tracker.reports().expect("stream claimed once");
        let lines = drain(&mut reports).await;
        assert!(
            lines.iter().any(|l| l.contains(report::START_MARKER)),
            "expected at least one non-empty report before close"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn periodic_summary_reflects_live_tasks() {
        let tracker = Tracker::new(Duration::from_millis(10));
        tracker.start("foo");
        tracker.start("foo");
        tracker.start("bar");

        let mut reports = tracker.reports().expect("stream claimed once");
        let mut found = false;
        let wait = async {
            while let Some(line) = reports.recv().await {
                if line == "[T=3] ≡ bar:1 foo:2" {
                    found = true;
                    break;
                }
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(2), wait).await;
        assert!(found, "expected a summary line with the live counts");

        tracker.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn default_config_keeps_reporting_on_empty() {
        let tracker = Tracker::new(Duration::from_millis(10));
        let mut reports = tracker.reports().expect("stream claimed once");

        let line = tokio::time::timeout(Duration::from_secs(2), reports.recv())
            .await
            .expect("a summary should arrive within the interval")
            .expect("stream should stay open on empty snapshots");
        assert_eq!(line, "[T=0] ≡ (empty)");
        assert!(!tracker.is_stopped());

        tracker.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn auto_stop_on_empty_closes_the_stream() {
        let mut config = Config::new(Duration::from_millis(10));
        config.auto_stop_on_empty = true;
        let tracker = Tracker::with_config(config);

        let mut reports = tracker.reports().expect("stream claimed once");
        let lines = drain(&mut reports).await;
        assert!(tracker.is_stopped());
        assert_eq!(lines.last().map(String::as_str), Some("[T=0] ≡ (empty)"));

        // An explicit stop after auto-stop is still a quiet no-op.
        tracker.stop().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reports_stream_is_claimed_once() {
        let tracker = Tracker::new(Duration::from_millis(50));
        let first = tracker.reports();
        assert!(first.is_some());
        assert!(tracker.reports().is_none());
        tracker.stop().await;
    }
}
