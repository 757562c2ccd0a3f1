//! C8: Notification Helper.
//!
//! Public surface and wire-level delivery are split per the teacher's
//! trait/impl separation (`HealthCheckClient`/`IsahcHealthCheckClient`):
//! `Notifier` is the narrow, test-friendly surface the orchestrator and
//! monitor pool call; `WebhookNotifier` is the production implementation.
//! Every call here is fire-and-forget from the caller's perspective --
//! failures are logged, never returned (§4.8).

pub mod webhook;

use crate::config::NotifyConfig;
use crate::core::model::{MonitorCycleCompleteData, MonitorInterruptData, ScanSummaryData};
use crate::logging::Logger;
use async_trait::async_trait;
use isahc::HttpClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use webhook::{AllowedMentions, Embed, EmbedField, WebhookError, WebhookPayload};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_scan_start(&self, summary: &ScanSummaryData);
    async fn notify_scan_complete(&self, summary: &ScanSummaryData, report_paths: &[PathBuf]);
    async fn notify_scan_interrupt(&self, summary: &ScanSummaryData);
    async fn notify_critical(&self, component: &str, summary: &ScanSummaryData);
    async fn notify_monitor_start(&self, cycle_id: &str);
    async fn notify_monitor_cycle_complete(&self, data: &MonitorCycleCompleteData);
    async fn notify_monitor_interrupt(&self, data: &MonitorInterruptData);
    async fn notify_monitor_error(&self, cycle_id: &str, url: &str, error: &str);
    async fn notify_monitored_urls(&self, urls: &[String], cycle_id: &str);
}

/// Discards every notification. Used in tests and whenever both webhooks
/// are unset.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_scan_start(&self, _summary: &ScanSummaryData) {}
    async fn notify_scan_complete(&self, _summary: &ScanSummaryData, _report_paths: &[PathBuf]) {}
    async fn notify_scan_interrupt(&self, _summary: &ScanSummaryData) {}
    async fn notify_critical(&self, _component: &str, _summary: &ScanSummaryData) {}
    async fn notify_monitor_start(&self, _cycle_id: &str) {}
    async fn notify_monitor_cycle_complete(&self, _data: &MonitorCycleCompleteData) {}
    async fn notify_monitor_interrupt(&self, _data: &MonitorInterruptData) {}
    async fn notify_monitor_error(&self, _cycle_id: &str, _url: &str, _error: &str) {}
    async fn notify_monitored_urls(&self, _urls: &[String], _cycle_id: &str) {}
}

enum Service {
    Scan,
    Monitor,
    Critical,
}

pub struct WebhookNotifier {
    config: NotifyConfig,
    client: HttpClient,
    logger: Arc<Logger>,
}

impl WebhookNotifier {
    pub fn new(config: NotifyConfig, logger: Arc<Logger>) -> Result<Self, WebhookError> {
        let client = HttpClient::builder()
            .build()
            .map_err(|e| WebhookError::Build(e.to_string()))?;
        Ok(Self { config, client, logger })
    }

    fn webhook_for(&self, service: Service) -> Option<&str> {
        match service {
            Service::Scan => self.config.scan_webhook.as_deref(),
            Service::Monitor => self
                .config
                .monitor_webhook
                .as_deref()
                .or(self.config.scan_webhook.as_deref()),
            // critical events fall back from scan to monitor when scan is unset (§4.8 ii)
            Service::Critical => self
                .config
                .scan_webhook
                .as_deref()
                .or(self.config.monitor_webhook.as_deref()),
        }
    }

    fn allowed_mentions(&self) -> AllowedMentions {
        AllowedMentions {
            parse: Vec::new(),
            roles: self.config.mention_role_ids.clone(),
        }
    }

    /// Send with the §4.8 retry policy: 2 attempts after the first, fixed
    /// 5s delay, `Retry-After` respected on 429, terminal on other 4xx.
    async fn send_with_retry<F, Fut>(&self, send: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), WebhookError>>,
    {
        let mut attempts = 0;
        loop {
            match send().await {
                Ok(()) => return,
                Err(e) if attempts >= 2 => {
                    self.logger.event("notify", "send_failed", serde_json::json!({"error": e.to_string()}));
                    return;
                }
                Err(WebhookError::RateLimited(retry_after)) => {
                    tokio::time::sleep(retry_after).await;
                }
                Err(WebhookError::Terminal(status)) => {
                    self.logger.event("notify", "send_terminal", serde_json::json!({"status": status}));
                    return;
                }
                Err(_) => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
            attempts += 1;
        }
    }

    async fn send_message(&self, service: Service, content: String, embeds: Vec<Embed>) {
        let Some(url) = self.webhook_for(service).map(str::to_string) else {
            return;
        };
        let payload = WebhookPayload {
            username: "monsterinc".to_string(),
            avatar_url: None,
            content,
            embeds,
            allowed_mentions: self.allowed_mentions(),
        };
        self.send_with_retry(|| webhook::post_json(&self.client, &url, &payload)).await;
    }

    /// Send a message with report files attached: first embedded, the rest
    /// as minimal attachments paced 500ms apart, oversized files
    /// gzip-compressed once and annotated if still too large (§4.8 iii-iv).
    async fn send_with_attachments(
        &self,
        service: Service,
        content: String,
        embeds: Vec<Embed>,
        report_paths: &[PathBuf],
    ) {
        let Some(url) = self.webhook_for(service).map(str::to_string) else {
            return;
        };

        let mut sent_any = false;
        let mut to_delete = Vec::new();

        for (i, path) in report_paths.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            let mut embeds = if i == 0 { embeds.clone() } else { Vec::new() };
            let Ok(mut bytes) = webhook::read_file(path) else {
                continue;
            };
            let mut filename = file_name(path);

            let mut annotation = None;
            if bytes.len() as u64 > webhook::ATTACHMENT_SAFE_LIMIT_BYTES {
                match webhook::compress_once(&bytes) {
                    Ok(compressed) if (compressed.len() as u64) <= webhook::ATTACHMENT_SAFE_LIMIT_BYTES => {
                        bytes = compressed;
                        filename = format!("{filename}.gz");
                    }
                    Ok(_) => {
                        annotation = Some(format!("Report `{filename}` exceeds the attachment limit; not attached."));
                        bytes.clear();
                    }
                    Err(_) => {
                        annotation = Some(format!("Report `{filename}` could not be compressed; not attached."));
                        bytes.clear();
                    }
                }
            }

            if let Some(note) = annotation {
                if i == 0 {
                    embeds.iter_mut().for_each(|e| e.description.push_str(&format!("\n{note}")));
                }
                self.send_message(
                    Service::Scan,
                    if i == 0 { content.clone() } else { note },
                    embeds,
                )
                .await;
                continue;
            }

            let payload = WebhookPayload {
                username: "monsterinc".to_string(),
                avatar_url: None,
                content: if i == 0 { content.clone() } else { String::new() },
                embeds,
                allowed_mentions: self.allowed_mentions(),
            };
            let files = vec![(filename, bytes)];
            let url = url.clone();
            self.send_with_retry(|| webhook::post_multipart(&self.client, &url, &payload, &files)).await;
            sent_any = true;
            to_delete.push(path.clone());
        }

        if sent_any && self.config.auto_delete_reports {
            for path in to_delete {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("report").to_string()
}

fn status_color(status: &crate::core::model::ScanStatus) -> u32 {
    use crate::core::model::ScanStatus::*;
    match status {
        Completed => 0x2ecc71,
        Failed | CriticalError => 0xe74c3c,
        Interrupted | PartialComplete | CompletedWithIssues => 0xf39c12,
        NoTargets | Unknown | Started => 0x95a5a6,
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_scan_start(&self, summary: &ScanSummaryData) {
        if !self.config.on_scan_start {
            return;
        }
        let embed = Embed {
            title: "Scan started".to_string(),
            description: format!("{} targets from {}", summary.total_targets, summary.target_source),
            color: status_color(&summary.status),
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            ..Default::default()
        };
        self.send_message(Service::Scan, String::new(), vec![embed]).await;
    }

    async fn notify_scan_complete(&self, summary: &ScanSummaryData, report_paths: &[PathBuf]) {
        let ok = matches!(
            summary.status,
            crate::core::model::ScanStatus::Completed | crate::core::model::ScanStatus::CompletedWithIssues
        );
        if (ok && !self.config.on_success) || (!ok && !self.config.on_failure) {
            return;
        }
        let embed = Embed {
            title: format!("Scan {:?}", summary.status),
            description: format!(
                "probed {} / new {} / existing {} / old {}",
                summary.probe_stats.total_probed,
                summary.diff_stats.new_count,
                summary.diff_stats.existing_count,
                summary.diff_stats.old_count
            ),
            color: status_color(&summary.status),
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            fields: vec![EmbedField {
                name: "duration_secs".to_string(),
                value: format!("{:.2}", summary.duration_secs),
                inline: true,
            }],
            ..Default::default()
        };
        if report_paths.is_empty() {
            self.send_message(Service::Scan, String::new(), vec![embed]).await;
        } else {
            self.send_with_attachments(Service::Scan, String::new(), vec![embed], report_paths).await;
        }
    }

    async fn notify_scan_interrupt(&self, summary: &ScanSummaryData) {
        let embed = Embed {
            title: "Scan interrupted".to_string(),
            description: format!("probed {} before cancellation", summary.probe_stats.total_probed),
            color: status_color(&summary.status),
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            ..Default::default()
        };
        self.send_message(Service::Scan, String::new(), vec![embed]).await;
    }

    async fn notify_critical(&self, component: &str, summary: &ScanSummaryData) {
        if !self.config.on_critical {
            return;
        }
        let embed = Embed {
            title: format!("Critical error in {component}"),
            description: summary.errors.join("\n"),
            color: 0xe74c3c,
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            ..Default::default()
        };
        self.send_message(Service::Critical, String::new(), vec![embed]).await;
    }

    async fn notify_monitor_start(&self, cycle_id: &str) {
        if !self.config.on_scan_start {
            return;
        }
        let embed = Embed {
            title: "Monitor cycle started".to_string(),
            description: cycle_id.to_string(),
            color: 0x95a5a6,
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            ..Default::default()
        };
        self.send_message(Service::Monitor, String::new(), vec![embed]).await;
    }

    async fn notify_monitor_cycle_complete(&self, data: &MonitorCycleCompleteData) {
        let ok = data.errors.is_empty();
        if (ok && !self.config.on_success) || (!ok && !self.config.on_failure) {
            return;
        }
        let embed = Embed {
            title: "Monitor cycle complete".to_string(),
            description: format!("{} change(s), {} error(s)", data.changes.len(), data.errors.len()),
            color: if ok { 0x2ecc71 } else { 0xf39c12 },
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            ..Default::default()
        };
        self.send_message(Service::Monitor, String::new(), vec![embed]).await;
    }

    async fn notify_monitor_interrupt(&self, data: &MonitorInterruptData) {
        let embed = Embed {
            title: "Monitor cycle interrupted".to_string(),
            description: format!("{}/{} batches completed", data.batches_completed, data.batches_total),
            color: 0xf39c12,
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            ..Default::default()
        };
        self.send_message(Service::Monitor, String::new(), vec![embed]).await;
    }

    async fn notify_monitor_error(&self, cycle_id: &str, url: &str, error: &str) {
        if !self.config.on_failure {
            return;
        }
        let embed = Embed {
            title: "Monitor fetch error".to_string(),
            description: format!("{url}: {error}"),
            color: 0xe74c3c,
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            footer: Some(cycle_id.to_string()),
            ..Default::default()
        };
        self.send_message(Service::Monitor, String::new(), vec![embed]).await;
    }

    async fn notify_monitored_urls(&self, urls: &[String], cycle_id: &str) {
        if !self.config.on_scan_start {
            return;
        }
        let embed = Embed {
            title: "Monitored URLs".to_string(),
            description: urls.join("\n"),
            color: 0x95a5a6,
            timestamp: crate::core::time::local_timestamp_rfc3339(),
            footer: Some(cycle_id.to_string()),
            ..Default::default()
        };
        self.send_message(Service::Monitor, String::new(), vec![embed]).await;
    }
}
