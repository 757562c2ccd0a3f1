//! End-to-end scan-cycle coverage: normalize → probe → diff → persist,
//! across multiple cycles against a real on-disk history store.

use monsterinc::config::ScanConfig;
use monsterinc::core::history::HistoryStore;
use monsterinc::core::model::{ScanMode, ScanStatus};
use monsterinc::core::notify::NoopNotifier;
use monsterinc::core::probe::client::MockProbeClient;
use monsterinc::core::probe::HttpProbeClient;
use monsterinc::core::scan::ScanOrchestrator;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::watch;

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn disappearing_target_is_reported_old_on_the_next_cycle() {
    let dir = tempdir().unwrap();
    let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
    let config = ScanConfig::default();

    let client: Arc<dyn HttpProbeClient> = Arc::new(
        MockProbeClient::default()
            .ok("http://a.example.com/", 200, b"a")
            .ok("http://b.example.com/", 200, b"b"),
    );
    let orchestrator = ScanOrchestrator::new(history.clone(), client, Arc::new(NoopNotifier));

    let first = orchestrator
        .run(
            &["http://a.example.com".to_string(), "http://b.example.com".to_string()],
            "cli",
            ScanMode::Onetime,
            &config,
            "20260101-000000".to_string(),
            vec![],
            no_cancel(),
        )
        .await;
    assert_eq!(first.status, ScanStatus::Completed);
    assert_eq!(first.diff_stats.new_count, 2);

    // Second cycle only probes `a`; `b` should come back as historical but
    // unobserved ("old"), without a crawl step ever discovering it again.
    let client2: Arc<dyn HttpProbeClient> =
        Arc::new(MockProbeClient::default().ok("http://a.example.com/", 200, b"a"));
    let orchestrator2 = ScanOrchestrator::new(history.clone(), client2, Arc::new(NoopNotifier));
    let second = orchestrator2
        .run(
            &["http://a.example.com".to_string()],
            "cli",
            ScanMode::Onetime,
            &config,
            "20260101-000100".to_string(),
            vec![],
            no_cancel(),
        )
        .await;

    assert_eq!(second.diff_stats.existing_count, 1);
    assert!(second.probe_totals_consistent());

    let normalized_a = monsterinc::core::normalize::normalize("http://a.example.com").unwrap();
    let historical = history.historical_urls_for_root(&normalized_a).unwrap();
    assert!(historical.contains(&normalized_a));
}

#[tokio::test]
async fn failed_probes_keep_cycle_running_and_surface_in_stats() {
    let dir = tempdir().unwrap();
    let history = Arc::new(HistoryStore::open(dir.path()).unwrap());
    let client: Arc<dyn HttpProbeClient> = Arc::new(
        MockProbeClient::default()
            .ok("http://up.example.com/", 200, b"ok")
            .err(
                "http://down.example.com/",
                monsterinc::core::probe::ProbeError::Dns,
            ),
    );
    let orchestrator = ScanOrchestrator::new(history, client, Arc::new(NoopNotifier));
    let config = ScanConfig {
        retries: 0,
        ..Default::default()
    };

    let summary = orchestrator
        .run(
            &["http://up.example.com".to_string(), "http://down.example.com".to_string()],
            "cli",
            ScanMode::Onetime,
            &config,
            "20260101-000000".to_string(),
            vec![],
            no_cancel(),
        )
        .await;

    assert_eq!(summary.probe_stats.successful, 1);
    assert_eq!(summary.probe_stats.failed, 1);
    assert!(summary.probe_totals_consistent());
}
