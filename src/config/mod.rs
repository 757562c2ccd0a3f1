//! Configuration (§6). Plain struct + hand-written `Default`, loaded once
//! at process start and treated as immutable afterwards (§5 shared-resource
//! policy). Grounded in the teacher's `config/defaults.rs` pattern, minus
//! the TUI/theme branch (no counterpart here).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub threads: usize,
    pub timeout_secs: u64,
    pub retries: u32,
    pub rate_limit: u32,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub custom_headers: HashMap<String, String>,
    pub batch_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 10,
            timeout_secs: 10,
            retries: 2,
            rate_limit: 0,
            follow_redirects: true,
            max_redirects: 10,
            custom_headers: HashMap::new(),
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub batch_size: usize,
    pub workers: usize,
    pub interval_minutes: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            workers: 5,
            interval_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub retention_days: u32,
    pub prune_after_cycle: bool,
    pub root: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            prune_after_cycle: false,
            root: default_history_root(),
        }
    }
}

fn default_history_root() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".monsterinc");
    path.push("history");
    path
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub scan_webhook: Option<String>,
    pub monitor_webhook: Option<String>,
    pub on_scan_start: bool,
    pub on_success: bool,
    pub on_failure: bool,
    pub on_critical: bool,
    pub mention_role_ids: Vec<String>,
    pub auto_delete_reports: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            scan_webhook: None,
            monitor_webhook: None,
            on_scan_start: false,
            on_success: true,
            on_failure: true,
            on_critical: true,
            mention_role_ids: Vec::new(),
            auto_delete_reports: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub monitor: MonitorConfig,
    pub history: HistoryConfig,
    pub notify: NotifyConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.threads == 0 {
            return Err(ConfigError::Invalid("scan.threads must be > 0".to_string()));
        }
        if self.scan.batch_size == 0 {
            return Err(ConfigError::Invalid("scan.batch_size must be > 0".to_string()));
        }
        if self.monitor.workers == 0 {
            return Err(ConfigError::Invalid("monitor.workers must be > 0".to_string()));
        }
        if self.monitor.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "monitor.batch_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_filling_in_defaults() {
        let toml_str = r#"
            [scan]
            threads = 20
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scan.threads, 20);
        assert_eq!(config.scan.batch_size, ScanConfig::default().batch_size);
    }

    #[test]
    fn rejects_zero_threads() {
        let mut config = Config::default();
        config.scan.threads = 0;
        assert!(config.validate().is_err());
    }
}
