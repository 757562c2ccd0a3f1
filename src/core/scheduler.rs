//! C7: Scheduler.
//!
//! Owns the cancellation token and the onetime-vs-automated cycle loop
//! (§5). Installs the OS interrupt handler, runs the scan/monitor cycle
//! callback, sleeps the cycle interval in a cancellable wait, and
//! optionally prunes retained history after each automated cycle.

use crate::config::{HistoryConfig, SchedulerConfig};
use crate::core::error::MonsterError;
use crate::core::history::HistoryStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Onetime,
    Automated { cycle_interval: Duration },
}

/// Install a `watch` cancellation token tied to the process interrupt
/// signal. Shared by both onetime and automated runs so a single Ctrl-C
/// handler governs the whole process (§5: "single owner of cancellation").
pub fn install_cancel_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = tx.send(true);
    });
    rx
}

/// Drive `cycle` to completion under `mode`. For `Onetime`, runs once and
/// returns. For `Automated`, loops until cancelled, sleeping
/// `cycle_interval` between runs in a way that itself aborts promptly on
/// cancellation, and pruning history per `history_config.prune_after_cycle`
/// after each completed cycle. Returns the last cycle's outcome so the
/// caller can distinguish a failed cycle from a clean shutdown.
pub async fn run<F, Fut>(
    mode: RunMode,
    scheduler_config: &SchedulerConfig,
    history_config: &HistoryConfig,
    history: Arc<HistoryStore>,
    mut cancel: watch::Receiver<bool>,
    mut cycle: F,
) -> Result<(), MonsterError>
where
    F: FnMut(watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = Result<(), MonsterError>>,
{
    match mode {
        RunMode::Onetime => run_with_retry(scheduler_config, &mut cycle, cancel.clone()).await,
        RunMode::Automated { cycle_interval } => {
            let mut last = Ok(());
            loop {
                if *cancel.borrow() {
                    break;
                }

                last = run_with_retry(scheduler_config, &mut cycle, cancel.clone()).await;

                if history_config.prune_after_cycle {
                    prune_history(&history, history_config.retention_days);
                }

                if *cancel.borrow() {
                    break;
                }

                tokio::select! {
                    _ = cancel.changed() => break,
                    _ = tokio::time::sleep(cycle_interval) => {}
                }
            }
            last
        }
    }
}

/// Run `cycle` once, retrying failures whose `ErrorKind::is_retryable()` is
/// true (§7) up to `scheduler_config.max_retries` times with a fixed delay
/// between attempts; a permanent failure (validation, storage, ...) returns
/// immediately without consuming a retry. Aborts immediately on cancellation.
async fn run_with_retry<F, Fut>(
    scheduler_config: &SchedulerConfig,
    cycle: &mut F,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), MonsterError>
where
    F: FnMut(watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = Result<(), MonsterError>>,
{
    let mut attempt = 0u32;
    loop {
        if *cancel.borrow() {
            return Err(MonsterError::Cancelled);
        }
        match cycle(cancel.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if !e.kind().is_retryable() || attempt >= scheduler_config.max_retries {
                    return Err(e);
                }
                attempt += 1;
                tokio::select! {
                    _ = cancel.changed() => return Err(MonsterError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_secs(scheduler_config.retry_delay_secs)) => {}
                }
            }
        }
    }
}

fn prune_history(history: &HistoryStore, retention_days: u32) {
    let cutoff = crate::core::time::epoch_millis() - retention_days as i64 * 86_400_000;
    for hostname in history.get_hostnames_with_history() {
        let _ = history.delete_old_records_for_host(&hostname, cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    #[tokio::test]
    async fn onetime_mode_runs_cycle_exactly_once() {
        let dir = tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let (_tx, rx) = watch::channel(false);

        let calls_clone = calls.clone();
        run(
            RunMode::Onetime,
            &SchedulerConfig::default(),
            &HistoryConfig::default(),
            history,
            rx,
            move |_cancel| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failure_up_to_max_retries() {
        let dir = tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let (_tx, rx) = watch::channel(false);
        let scheduler_config = SchedulerConfig {
            max_retries: 2,
            retry_delay_secs: 0,
        };

        let calls_clone = calls.clone();
        let result = run(
            RunMode::Onetime,
            &scheduler_config,
            &HistoryConfig::default(),
            history,
            rx,
            move |_cancel| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(MonsterError::TransientNetwork("boom".to_string()))
                }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let dir = tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let (_tx, rx) = watch::channel(false);
        let scheduler_config = SchedulerConfig {
            max_retries: 2,
            retry_delay_secs: 0,
        };

        let calls_clone = calls.clone();
        let result = run(
            RunMode::Onetime,
            &scheduler_config,
            &HistoryConfig::default(),
            history,
            rx,
            move |_cancel| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(MonsterError::Validation("bad input".to_string()))
                }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancellation_stops_automated_loop_before_next_cycle() {
        let dir = tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let (tx, rx) = watch::channel(false);

        let calls_clone = calls.clone();
        let tx_clone = tx.clone();
        run(
            RunMode::Automated {
                cycle_interval: Duration::from_secs(60),
            },
            &SchedulerConfig::default(),
            &HistoryConfig::default(),
            history,
            rx,
            move |_cancel| {
                let calls = calls_clone.clone();
                let tx = tx_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(true);
                    Ok(())
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
