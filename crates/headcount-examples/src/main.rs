//! Demo: a handful of named workers tracked through their lifetime.
//!
//! Spawns three numbered workers plus a logger task, each bracketed by
//! `start`/`done` around a sleep, and prints every report line until the
//! tracker auto-stops on an empty snapshot. Auto-stop is an opt-in flag:
//! the workers here register well before the first tick, which is exactly
//! the window a long-lived service would need to worry about.
//!
//! `HEADCOUNT_INTERVAL_MS` overrides the report interval (default 100).

use std::time::Duration;

use headcount::{Config, Tracker};
use tracing::info;

fn report_interval() -> Duration {
    std::env::var("HEADCOUNT_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(100))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::new(report_interval());
    config.auto_stop_on_empty = true;
    let tracker = Tracker::with_config(config);
    let mut reports = tracker.reports().expect("first claim of the stream");

    for id in 0..3_u64 {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            let name = format!("worker{id}");
            tracker.start(&name);
            tokio::time::sleep(Duration::from_secs(id + 1)).await;
            tracker.done(&name);
        });
    }

    {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            tracker.start("logger");
            tokio::time::sleep(Duration::from_secs(1)).await;
            tracker.done("logger");
        });
    }

    while let Some(line) = reports.recv().await {
        println!("{line}");
    }

    info!("tracker stopped");
}
