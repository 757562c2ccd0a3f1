//! Configuration and error types for the Probe Dispatcher (§4.4).

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub concurrency: usize,
    pub timeout: Duration,
    pub retries: u32,
    /// Requests per second; 0 disables the token bucket.
    pub rate_limit: u32,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub custom_headers: HashMap<String, String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout: Duration::from_secs(10),
            retries: 2,
            rate_limit: 0,
            follow_redirects: true,
            max_redirects: 10,
            custom_headers: HashMap::new(),
        }
    }
}

/// Classification surfaced to the caller as `probe_error` in a terminal
/// ProbeResult (§4.4 error mapping).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("dns")]
    Dns,
    #[error("timeout")]
    Timeout,
    #[error("tls")]
    Tls,
    #[error("max-redirects")]
    MaxRedirects,
    #[error("{0}")]
    Other(String),
}

impl ProbeError {
    /// Transient errors (timeout, reset) are retried by the dispatcher;
    /// everything else is terminal on the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProbeError::Timeout | ProbeError::Other(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeError::Dns => "dns",
            ProbeError::Timeout => "timeout",
            ProbeError::Tls => "tls",
            ProbeError::MaxRedirects => "max-redirects",
            ProbeError::Other(_) => "other",
        }
    }

    /// Classify a raw isahc/io error by inspecting its message, mirroring
    /// the teacher's string-based error passthrough in `HealthCheckClient`.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("dns") || lower.contains("resolve") || lower.contains("nxdomain") {
            ProbeError::Dns
        } else if lower.contains("timed out") || lower.contains("timeout") {
            ProbeError::Timeout
        } else if lower.contains("tls") || lower.contains("certificate") || lower.contains("ssl") {
            ProbeError::Tls
        } else if lower.contains("too many redirects") || lower.contains("max-redirects") {
            ProbeError::MaxRedirects
        } else {
            ProbeError::Other(message.to_string())
        }
    }
}
