//! C5: Monitor Worker Pool.
//!
//! Periodic re-fetch of monitored URLs in batches (§4.5): fetch, hash,
//! diff against the last known record, persist, aggregate into one
//! `MonitorCycleCompleteData` per cycle.

use crate::config::MonitorConfig;
use crate::core::diff::content_diff;
use crate::core::history::segment::HistoryRow;
use crate::core::history::HistoryStore;
use crate::core::model::{
    BatchStats, FileChangeInfoSummary, FileHistoryRecord, MonitorCycleCompleteData,
    MonitorFetchErrorInfo, MonitorInterruptData,
};
use crate::core::notify::Notifier;
use crate::core::probe::{self, HttpProbeClient, ProbeConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub struct MonitorPool {
    history: Arc<HistoryStore>,
    client: Arc<dyn HttpProbeClient>,
    notifier: Arc<dyn Notifier>,
}

impl MonitorPool {
    pub fn new(history: Arc<HistoryStore>, client: Arc<dyn HttpProbeClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self { history, client, notifier }
    }

    /// Run one monitor cycle over `urls` (§4.5 steps 1-6). Invariant (i) "at
    /// most one fetch in flight per URL per cycle" holds because each URL
    /// appears in exactly one batch.
    pub async fn run_cycle(
        &self,
        urls: &[String],
        config: &MonitorConfig,
        timeout: Duration,
        cycle_id: String,
        cancel: watch::Receiver<bool>,
    ) -> MonitorCycleCompleteData {
        let start = Instant::now();
        self.notifier.notify_monitor_start(&cycle_id).await;
        self.notifier.notify_monitored_urls(urls, &cycle_id).await;

        let batches: Vec<&[String]> = urls.chunks(config.batch_size.max(1)).collect();
        let total_batches = batches.len();

        let mut changes = Vec::new();
        let mut errors = Vec::new();
        let mut stats = BatchStats {
            total_batches,
            ..Default::default()
        };
        let mut batches_completed = 0;
        let mut interrupted = false;

        let probe_config = ProbeConfig {
            concurrency: config.workers.max(1),
            timeout,
            retries: 1,
            rate_limit: 0,
            follow_redirects: true,
            max_redirects: 5,
            custom_headers: Default::default(),
        };

        for batch in &batches {
            if *cancel.borrow() {
                interrupted = true;
                break;
            }

            let results = probe::dispatch(
                batch,
                "monitor",
                self.client.clone(),
                probe_config.clone(),
                "GET",
                cancel.clone(),
            )
            .await;

            for result in results {
                stats.total_processed += 1;
                if let Some(error) = &result.error {
                    stats.total_errors += 1;
                    errors.push(MonitorFetchErrorInfo {
                        url: result.input_url.clone(),
                        error: error.clone(),
                    });
                    continue;
                }

                let body = result.body.unwrap_or_default();
                let new_hash = content_diff::hash_body(&body);
                let prior = self.history.get_last_known_record(&result.input_url).ok().flatten();
                let unchanged = prior.as_ref().is_some_and(|p| p.content_hash == new_hash);
                if unchanged {
                    continue;
                }

                let old_body = prior.as_ref().and_then(|p| p.content.clone()).unwrap_or_default();
                let old_hash = prior.as_ref().map(|p| p.content_hash.clone()).unwrap_or_default();
                let diff = content_diff::diff(&old_body, &body, result.content_type.as_deref());

                let record = FileHistoryRecord {
                    url: result.input_url.clone(),
                    timestamp: crate::core::time::epoch_millis(),
                    content_hash: new_hash.clone(),
                    content_type: result.content_type.clone(),
                    content: Some(body),
                    etag: result.headers.get("etag").cloned(),
                    last_modified: result.headers.get("last-modified").cloned(),
                    content_diff: serde_json::to_value(&diff).ok(),
                    extracted_paths: None,
                };

                if let Err(e) = self.history.store(HistoryRow::Content(record)) {
                    stats.total_errors += 1;
                    errors.push(MonitorFetchErrorInfo {
                        url: result.input_url.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }

                changes.push(FileChangeInfoSummary {
                    url: result.input_url,
                    old_hash,
                    new_hash,
                    lines_added: diff.lines_added,
                    lines_deleted: diff.lines_deleted,
                });
            }

            batches_completed += 1;
        }

        let data = MonitorCycleCompleteData {
            cycle_id: cycle_id.clone(),
            changes,
            errors,
            stats,
            duration_secs: start.elapsed().as_secs_f64(),
        };

        if interrupted {
            self.notifier
                .notify_monitor_interrupt(&MonitorInterruptData {
                    cycle_id,
                    batches_completed,
                    batches_total: total_batches,
                })
                .await;
        } else {
            self.notifier.notify_monitor_cycle_complete(&data).await;
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notify::NoopNotifier;
    use crate::core::probe::client::MockProbeClient;
    use tempfile::tempdir;

    fn watch_false() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn first_fetch_records_baseline_without_error() {
        let dir = tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
        let client: Arc<dyn HttpProbeClient> =
            Arc::new(MockProbeClient::default().ok("http://example.com/app.js", 200, b"console.log(1)"));
        let pool = MonitorPool::new(history.clone(), client, Arc::new(NoopNotifier));

        let config = MonitorConfig {
            batch_size: 10,
            workers: 2,
            interval_minutes: 5,
        };
        let data = pool
            .run_cycle(
                &["http://example.com/app.js".to_string()],
                &config,
                Duration::from_secs(5),
                "cycle-1".to_string(),
                watch_false(),
            )
            .await;

        assert_eq!(data.changes.len(), 1);
        assert_eq!(data.errors.len(), 0);
        let stored = history.get_last_known_hash("http://example.com/app.js").unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn unchanged_content_produces_no_change_event() {
        let dir = tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
        let client: Arc<dyn HttpProbeClient> =
            Arc::new(MockProbeClient::default().ok("http://example.com/app.js", 200, b"same"));
        let pool = MonitorPool::new(history.clone(), client.clone(), Arc::new(NoopNotifier));
        let config = MonitorConfig {
            batch_size: 10,
            workers: 2,
            interval_minutes: 5,
        };

        pool.run_cycle(
            &["http://example.com/app.js".to_string()],
            &config,
            Duration::from_secs(5),
            "cycle-1".to_string(),
            watch_false(),
        )
        .await;
        let data = pool
            .run_cycle(
                &["http://example.com/app.js".to_string()],
                &config,
                Duration::from_secs(5),
                "cycle-2".to_string(),
                watch_false(),
            )
            .await;

        assert_eq!(data.changes.len(), 0);
    }

    #[tokio::test]
    async fn content_change_emits_diff_with_old_and_new_hash() {
        let dir = tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
        let client: Arc<dyn HttpProbeClient> =
            Arc::new(MockProbeClient::default().ok("http://example.com/app.js", 200, b"abc"));
        let pool = MonitorPool::new(history.clone(), client, Arc::new(NoopNotifier));
        let config = MonitorConfig {
            batch_size: 10,
            workers: 2,
            interval_minutes: 5,
        };
        pool.run_cycle(
            &["http://example.com/app.js".to_string()],
            &config,
            Duration::from_secs(5),
            "cycle-1".to_string(),
            watch_false(),
        )
        .await;

        let client2: Arc<dyn HttpProbeClient> =
            Arc::new(MockProbeClient::default().ok("http://example.com/app.js", 200, b"abcdef"));
        let pool2 = MonitorPool::new(history, client2, Arc::new(NoopNotifier));
        let data = pool2
            .run_cycle(
                &["http://example.com/app.js".to_string()],
                &config,
                Duration::from_secs(5),
                "cycle-2".to_string(),
                watch_false(),
            )
            .await;

        assert_eq!(data.changes.len(), 1);
        assert!(data.changes[0].lines_added >= 1 || data.changes[0].new_hash != data.changes[0].old_hash);
    }

    #[tokio::test]
    async fn fetch_error_reported_without_aborting_cycle() {
        let dir = tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
        let client: Arc<dyn HttpProbeClient> = Arc::new(
            MockProbeClient::default()
                .ok("http://ok.example.com/a", 200, b"x")
                .err("http://down.example.com/a", crate::core::probe::ProbeError::Dns),
        );
        let pool = MonitorPool::new(history, client, Arc::new(NoopNotifier));
        let config = MonitorConfig {
            batch_size: 10,
            workers: 2,
            interval_minutes: 5,
        };
        let data = pool
            .run_cycle(
                &["http://ok.example.com/a".to_string(), "http://down.example.com/a".to_string()],
                &config,
                Duration::from_secs(5),
                "cycle-1".to_string(),
                watch_false(),
            )
            .await;

        assert_eq!(data.errors.len(), 1);
        assert_eq!(data.changes.len(), 1);
    }
}
