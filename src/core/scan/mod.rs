//! C6: Scan Orchestrator.
//!
//! Drives one scan cycle over a list of root target URLs (§4.6): normalize
//! → batch → probe → diff → persist → summarize. Extraction/crawling is
//! out of scope (§1 non-goals), so every normalized target is itself a
//! root target -- there is no sub-URL expansion step here.

use crate::config::ScanConfig;
use crate::core::diff::url_diff;
use crate::core::history::segment::HistoryRow;
use crate::core::history::HistoryStore;
use crate::core::model::{
    DiffStats, ProbeStats, ScanMode, ScanStatus, ScanSummaryData,
};
use crate::core::normalize;
use crate::core::notify::Notifier;
use crate::core::probe::{self, HttpProbeClient, ProbeConfig};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub struct ScanOrchestrator {
    history: Arc<HistoryStore>,
    client: Arc<dyn HttpProbeClient>,
    notifier: Arc<dyn Notifier>,
}

impl ScanOrchestrator {
    pub fn new(history: Arc<HistoryStore>, client: Arc<dyn HttpProbeClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self { history, client, notifier }
    }

    pub async fn run(
        &self,
        raw_targets: &[String],
        target_source: &str,
        mode: ScanMode,
        config: &ScanConfig,
        session_id: String,
        report_paths: Vec<PathBuf>,
        cancel: watch::Receiver<bool>,
    ) -> ScanSummaryData {
        let start = Instant::now();

        let (targets, mut errors) = normalize_and_dedupe(raw_targets);

        if targets.is_empty() {
            let summary = ScanSummaryData {
                session_id,
                target_source: target_source.to_string(),
                mode,
                targets: Vec::new(),
                total_targets: 0,
                probe_stats: ProbeStats::default(),
                diff_stats: DiffStats::default(),
                duration_secs: start.elapsed().as_secs_f64(),
                report_paths: Vec::new(),
                status: ScanStatus::NoTargets,
                errors,
                component: None,
                retries_attempted: 0,
                cycle_interval_minutes: None,
            };
            self.notifier.notify_scan_start(&summary).await;
            return summary;
        }

        let start_summary = ScanSummaryData {
            session_id: session_id.clone(),
            target_source: target_source.to_string(),
            mode: mode.clone(),
            targets: targets.clone(),
            total_targets: targets.len(),
            probe_stats: ProbeStats::default(),
            diff_stats: DiffStats::default(),
            duration_secs: 0.0,
            report_paths: Vec::new(),
            status: ScanStatus::Started,
            errors: Vec::new(),
            component: None,
            retries_attempted: 0,
            cycle_interval_minutes: None,
        };
        self.notifier.notify_scan_start(&start_summary).await;

        let probe_config = ProbeConfig {
            concurrency: config.threads,
            timeout: Duration::from_secs(config.timeout_secs),
            retries: config.retries,
            rate_limit: config.rate_limit,
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            custom_headers: config.custom_headers.clone(),
        };

        let mut probe_stats = ProbeStats::default();
        let mut diff_stats = DiffStats::default();
        let mut interrupted = false;

        for batch in targets.chunks(config.batch_size.max(1)) {
            if *cancel.borrow() {
                interrupted = true;
                break;
            }

            let pairs: Vec<(String, String)> = batch.iter().map(|t| (t.clone(), t.clone())).collect();
            let results = probe::dispatch_with_roots(
                &pairs,
                self.client.clone(),
                probe_config.clone(),
                "GET",
                cancel.clone(),
            )
            .await;

            for result in results {
                probe_stats.total_probed += 1;
                if result.error.is_some() {
                    probe_stats.failed += 1;
                } else {
                    probe_stats.successful += 1;
                }

                let root = result.root_target_url.clone();
                let historical = self
                    .history
                    .historical_urls_for_root(&root)
                    .unwrap_or_default();
                let last_known = self
                    .history
                    .last_known_probe_results_for_root(&root)
                    .unwrap_or_default();

                let diff = url_diff::diff_urls(&root, std::slice::from_ref(&result), &historical, &last_known);
                diff_stats.new_count += diff.new_count;
                diff_stats.existing_count += diff.existing_count;
                diff_stats.old_count += diff.old_count;

                for diffed in &diff.results {
                    if diffed.result.url_status == "old" {
                        continue; // synthetic carry-forward entry, nothing new to persist
                    }
                    if let Err(e) = self.history.store(HistoryRow::Probe(diffed.result.clone())) {
                        errors.push(format!("{}: {e}", diffed.result.input_url));
                    }
                }
            }
        }

        let status = if interrupted {
            ScanStatus::Interrupted
        } else if !errors.is_empty() && probe_stats.successful > 0 {
            ScanStatus::CompletedWithIssues
        } else if probe_stats.successful == 0 && probe_stats.total_probed > 0 {
            ScanStatus::Failed
        } else {
            ScanStatus::Completed
        };

        let total_targets = targets.len();
        let summary = ScanSummaryData {
            session_id,
            target_source: target_source.to_string(),
            mode,
            targets,
            total_targets,
            probe_stats,
            diff_stats,
            duration_secs: start.elapsed().as_secs_f64(),
            report_paths: report_paths.clone(),
            status: status.clone(),
            errors,
            component: None,
            retries_attempted: 0,
            cycle_interval_minutes: None,
        };

        if matches!(status, ScanStatus::Interrupted) {
            self.notifier.notify_scan_interrupt(&summary).await;
        } else {
            self.notifier.notify_scan_complete(&summary, &report_paths).await;
        }

        summary
    }
}

fn normalize_and_dedupe(raw_targets: &[String]) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut errors = Vec::new();
    for raw in raw_targets {
        match normalize::normalize(raw) {
            Ok(url) => {
                if seen.insert(url.clone()) {
                    targets.push(url);
                }
            }
            Err(e) => errors.push(format!("{raw}: {e}")),
        }
    }
    (targets, errors)
}
