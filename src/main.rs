use monsterinc::cli::{Cli, Mode};
use monsterinc::config::Config;
use monsterinc::core::error::MonsterError;
use monsterinc::core::history::HistoryStore;
use monsterinc::core::model::ScanMode;
use monsterinc::core::monitor::MonitorPool;
use monsterinc::core::notify::{Notifier, WebhookNotifier};
use monsterinc::core::probe::{HttpProbeClient, IsahcProbeClient};
use monsterinc::core::scan::ScanOrchestrator;
use monsterinc::core::scheduler::{self, RunMode};
use monsterinc::core::time;
use monsterinc::logging::Logger;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 2;
const EXIT_CONFIG_ERROR: u8 = 3;

fn main() -> ExitCode {
    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    ExitCode::from(runtime.block_on(run()))
}

async fn run() -> u8 {
    let cli = Cli::parse_args();

    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    };
    let config = match config.and_then(|c| c.validate().map(|_| c)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };

    let targets = match &cli.targets {
        Some(path) => match monsterinc::cli::read_targets(path) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("failed to read targets file: {e}");
                return EXIT_CONFIG_ERROR;
            }
        },
        None => Vec::new(),
    };

    let logger = Arc::new(Logger::new(Logger::default_path()));

    let history = match HistoryStore::open(&config.history.root) {
        Ok(h) => Arc::new(h),
        Err(e) => {
            eprintln!("failed to open history store: {e}");
            return EXIT_FAILURE;
        }
    };

    let client: Arc<dyn HttpProbeClient> = match IsahcProbeClient::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("failed to build http client: {e}");
            return EXIT_FAILURE;
        }
    };

    let notifier: Arc<dyn Notifier> = match WebhookNotifier::new(config.notify.clone(), logger.clone()) {
        Ok(n) => Arc::new(n),
        Err(e) => {
            eprintln!("failed to build webhook notifier: {e}");
            return EXIT_FAILURE;
        }
    };

    let cancel = scheduler::install_cancel_handler();

    let run_mode = match cli.mode {
        Mode::Onetime => RunMode::Onetime,
        Mode::Automated => RunMode::Automated {
            cycle_interval: Duration::from_secs(
                cli.cycle_minutes.unwrap_or(config.monitor.interval_minutes) * 60,
            ),
        },
    };
    let scan_mode = match cli.mode {
        Mode::Onetime => ScanMode::Onetime,
        Mode::Automated => ScanMode::Automated,
    };

    let orchestrator = ScanOrchestrator::new(history.clone(), client.clone(), notifier.clone());
    let monitor_pool = MonitorPool::new(history.clone(), client, notifier);

    let target_source = cli
        .targets
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "cli".to_string());

    let cycle_result = scheduler::run(
        run_mode,
        &config.scheduler,
        &config.history,
        history.clone(),
        cancel.clone(),
        |cycle_cancel| {
            let orchestrator = &orchestrator;
            let monitor_pool = &monitor_pool;
            let targets = &targets;
            let target_source = &target_source;
            let scan_mode = scan_mode.clone();
            let scan_config = &config.scan;
            let monitor_config = &config.monitor;
            async move {
                let session_id = time::generate_session_id();

                let summary = orchestrator
                    .run(
                        targets,
                        target_source,
                        scan_mode,
                        scan_config,
                        session_id.clone(),
                        Vec::new(),
                        cycle_cancel.clone(),
                    )
                    .await;

                let timeout = Duration::from_secs(scan_config.timeout_secs);
                monitor_pool
                    .run_cycle(targets, monitor_config, timeout, session_id, cycle_cancel)
                    .await;

                if matches!(summary.status, monsterinc::core::model::ScanStatus::Failed) {
                    Err(MonsterError::TransientNetwork(
                        "scan cycle failed: no probes succeeded".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        },
    )
    .await;

    if *cancel.borrow() {
        EXIT_INTERRUPTED
    } else if cycle_result.is_err() {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    }
}
