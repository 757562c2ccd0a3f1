//! End-to-end scheduler coverage: automated mode driving repeated scan
//! cycles against a real history store until cancelled.

use monsterinc::config::{HistoryConfig, SchedulerConfig};
use monsterinc::core::history::HistoryStore;
use monsterinc::core::scheduler::{self, RunMode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::watch;

#[tokio::test]
async fn automated_mode_runs_multiple_cycles_until_cancelled() {
    let dir = tempdir().unwrap();
    let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cycles = Arc::new(AtomicU32::new(0));

    let cycles_clone = cycles.clone();
    let cancel_tx_clone = cancel_tx.clone();
    scheduler::run(
        RunMode::Automated {
            cycle_interval: Duration::from_millis(10),
        },
        &SchedulerConfig::default(),
        &HistoryConfig::default(),
        history,
        cancel_rx,
        move |_cancel| {
            let cycles = cycles_clone.clone();
            let cancel_tx = cancel_tx_clone.clone();
            async move {
                let n = cycles.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 3 {
                    let _ = cancel_tx.send(true);
                }
                Ok(())
            }
        },
    )
    .await
    .unwrap();

    assert_eq!(cycles.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn onetime_mode_never_sleeps_between_cycles() {
    let dir = tempdir().unwrap();
    let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
    let (_tx, rx) = watch::channel(false);
    let cycles = Arc::new(AtomicU32::new(0));
    let cycles_clone = cycles.clone();

    let start = std::time::Instant::now();
    scheduler::run(
        RunMode::Onetime,
        &SchedulerConfig::default(),
        &HistoryConfig::default(),
        history,
        rx,
        move |_cancel| {
            let cycles = cycles_clone.clone();
            async move {
                cycles.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        },
    )
    .await
    .unwrap();

    assert_eq!(cycles.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_millis(500));
}
