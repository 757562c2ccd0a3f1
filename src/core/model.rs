//! Shared data model (§3). Plain record types + free-standing validation,
//! per Design Notes §9 -- no validator/timestamped/identifiable trait soup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One per URL per scan (§3 ProbeResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub input_url: String,
    pub final_url: String,
    pub method: String,
    /// RFC3339 timestamp of the probe.
    pub timestamp: String,
    pub duration_secs: f64,
    pub error: Option<String>,
    pub root_target_url: String,
    pub status_code: u16,
    pub content_length: u64,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub title: Option<String>,
    pub web_server: Option<String>,
    pub ips: Vec<String>,
    pub cnames: Vec<String>,
    pub asn: Option<String>,
    pub asn_org: Option<String>,
    pub technologies: Vec<Technology>,
    pub tls: Option<TlsInfo>,
    /// Written by the URL-Set Differ. "new" | "old" | "existing".
    pub url_status: String,
    pub oldest_scan_timestamp: Option<String>,
}

impl ProbeResult {
    pub fn validate(&self) -> Result<(), String> {
        if self.content_length > i64::MAX as u64 {
            return Err("content_length overflow".to_string());
        }
        if self.error.is_some() && self.status_code != 0 {
            // allowed only when the probe library returned a partial response
            // (body/headers present alongside the error); otherwise a bug.
            if self.body.is_none() && self.headers.is_empty() {
                return Err("error set with non-zero status and no partial response".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    pub version: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsInfo {
    pub version: Option<String>,
    pub cipher: Option<String>,
    pub issuer: Option<String>,
    pub expiry: Option<String>,
}

/// One per successful content fetch of a monitored URL (§3 FileHistoryRecord).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHistoryRecord {
    pub url: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Hex digest of the normalized body.
    pub content_hash: String,
    pub content_type: Option<String>,
    pub content: Option<Vec<u8>>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_diff: Option<serde_json::Value>,
    pub extracted_paths: Option<serde_json::Value>,
}

/// One wrapped ProbeResult per URL in the union of current+historical (§3 DiffedURL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffedUrl {
    pub result: ProbeResult,
}

/// One per root target per scan cycle (§3 URLDiffResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlDiffResult {
    pub root_target_url: String,
    pub results: Vec<DiffedUrl>,
    pub new_count: usize,
    pub old_count: usize,
    pub existing_count: usize,
    pub error: Option<String>,
}

impl UrlDiffResult {
    /// Invariant (§3 ii): counts equal the exact multiplicities of status values.
    pub fn counts_are_consistent(&self) -> bool {
        let (mut n, mut o, mut e) = (0usize, 0usize, 0usize);
        for d in &self.results {
            match d.result.url_status.as_str() {
                "new" => n += 1,
                "old" => o += 1,
                "existing" => e += 1,
                _ => return false,
            }
        }
        n == self.new_count && o == self.old_count && e == self.existing_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffOpKind {
    Equal,
    Insert,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDiffOp {
    pub kind: DiffOpKind,
    pub text: String,
}

/// Per monitored URL per change detection (§3 ContentDiffResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDiffResult {
    pub timestamp: i64,
    pub content_type: Option<String>,
    pub operations: Vec<ContentDiffOp>,
    pub lines_added: usize,
    pub lines_deleted: usize,
    pub identical: bool,
    pub error: Option<String>,
    pub processing_duration_ms: u64,
    pub old_hash: String,
    pub new_hash: String,
    pub extracted_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchInfo {
    pub batch_number: usize,
    pub total_batches: usize,
    pub batch_size: usize,
    pub processed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_batches: usize,
    pub total_processed: usize,
    pub total_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Started,
    Completed,
    Failed,
    CriticalError,
    PartialComplete,
    Interrupted,
    CompletedWithIssues,
    NoTargets,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    Onetime,
    Automated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeStats {
    pub total_probed: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffStats {
    pub new_count: usize,
    pub existing_count: usize,
    pub old_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummaryData {
    pub session_id: String,
    pub target_source: String,
    pub mode: ScanMode,
    pub targets: Vec<String>,
    pub total_targets: usize,
    pub probe_stats: ProbeStats,
    pub diff_stats: DiffStats,
    pub duration_secs: f64,
    pub report_paths: Vec<std::path::PathBuf>,
    pub status: ScanStatus,
    pub errors: Vec<String>,
    pub component: Option<String>,
    pub retries_attempted: u32,
    pub cycle_interval_minutes: Option<u64>,
}

impl ScanSummaryData {
    /// Derived invariant (§4.6): TotalProbed = SuccessfulProbes + FailedProbes.
    pub fn probe_totals_consistent(&self) -> bool {
        self.probe_stats.total_probed == self.probe_stats.successful + self.probe_stats.failed
    }
}

#[derive(Debug, Clone)]
pub struct FileChangeInfo {
    pub url: String,
    pub old_hash: String,
    pub new_hash: String,
    pub diff: ContentDiffResult,
}

#[derive(Debug, Clone)]
pub struct MonitorFetchErrorInfo {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorCycleCompleteData {
    pub cycle_id: String,
    pub changes: Vec<FileChangeInfoSummary>,
    pub errors: Vec<MonitorFetchErrorInfo>,
    pub stats: BatchStats,
    pub duration_secs: f64,
}

/// Lightweight summary form of `FileChangeInfo` suitable for aggregation and
/// notification rendering (avoids carrying full diff op lists in the digest).
#[derive(Debug, Clone)]
pub struct FileChangeInfoSummary {
    pub url: String,
    pub old_hash: String,
    pub new_hash: String,
    pub lines_added: usize,
    pub lines_deleted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorInterruptData {
    pub cycle_id: String,
    pub batches_completed: usize,
    pub batches_total: usize,
}
