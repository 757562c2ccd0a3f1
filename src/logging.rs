//! Ambient structured logging: a size-rotating JSONL file logger plus
//! env-gated `eprintln` status lines for interactive use. Grounded in the
//! teacher's `debug_logger.rs` (`RotatingLogger`: size check, `fs2`
//! advisory lock around rotation, `flate2` gzip of the rotated file).
//! Log *delivery* (shipping to a collector) is out of scope per §1; this
//! is local-only.

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

const ROTATION_SIZE_BYTES: u64 = 8 * 1024 * 1024;
const MAX_ARCHIVES: usize = 5;
const ROTATION_CHECK_INTERVAL: u32 = 200;

pub fn parse_env_bool(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("true") | Ok("1") | Ok("yes") | Ok("on")
    )
}

struct RotatingLogger {
    path: PathBuf,
    write_count: AtomicU32,
}

impl RotatingLogger {
    fn new(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self {
            path,
            write_count: AtomicU32::new(0),
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        if self.write_count.fetch_add(1, Ordering::Relaxed) % ROTATION_CHECK_INTERVAL == 0 {
            let _ = self.rotate_if_needed();
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")
    }

    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.needs_rotation()? {
            return Ok(());
        }
        let lock_path = self.path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_ok() {
            if self.needs_rotation()? {
                self.rotate()?;
            }
            let _ = std::fs::remove_file(&lock_path);
        }
        Ok(())
    }

    fn needs_rotation(&self) -> std::io::Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        Ok(std::fs::metadata(&self.path)?.len() >= ROTATION_SIZE_BYTES)
    }

    fn rotate(&self) -> std::io::Result<()> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = self.path.file_name().unwrap().to_str().unwrap();
        let archive_path = self
            .path
            .parent()
            .unwrap()
            .join(format!("{filename}.{timestamp}.gz"));

        let temp_path = self.path.with_extension("rotating");
        std::fs::rename(&self.path, &temp_path)?;

        let source = File::open(&temp_path)?;
        let target = File::create(&archive_path)?;
        let mut encoder = GzEncoder::new(target, Compression::default());
        std::io::copy(&mut BufReader::new(source), &mut encoder)?;
        encoder.finish()?;
        std::fs::remove_file(&temp_path)?;

        self.prune_archives()?;
        Ok(())
    }

    fn prune_archives(&self) -> std::io::Result<()> {
        let dir = self.path.parent().unwrap();
        let filename = self.path.file_name().unwrap().to_str().unwrap();
        let mut archives = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&format!("{filename}.")) && name.ends_with(".gz") {
                archives.push((entry.path(), entry.metadata()?.modified()?));
            }
        }
        archives.sort_by_key(|(_, modified)| *modified);
        if archives.len() > MAX_ARCHIVES {
            for (path, _) in archives.iter().take(archives.len() - MAX_ARCHIVES) {
                let _ = std::fs::remove_file(path);
            }
        }
        Ok(())
    }
}

/// Structured event logger + verbose status printer used throughout the
/// scan/monitor pipeline.
pub struct Logger {
    jsonl: Mutex<RotatingLogger>,
    verbose: bool,
}

impl Logger {
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            jsonl: Mutex::new(RotatingLogger::new(log_path)),
            verbose: parse_env_bool("MONSTERINC_DEBUG"),
        }
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("MONSTERINC_LOG_FILE") {
            return PathBuf::from(path);
        }
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".monsterinc");
        path.push("monsterinc.jsonl");
        path
    }

    /// Write one structured record. Errors are swallowed: logging must
    /// never interrupt the scan/monitor pipeline.
    pub fn event(&self, component: &str, event: &str, fields: impl Serialize) {
        let record = serde_json::json!({
            "timestamp": Local::now().to_rfc3339(),
            "component": component,
            "event": event,
            "fields": fields,
        });
        if let Ok(line) = serde_json::to_string(&record) {
            if let Ok(logger) = self.jsonl.lock() {
                let _ = logger.write_line(&line);
            }
        }
    }

    /// Interactive status line, gated by `MONSTERINC_DEBUG`.
    pub fn status(&self, message: impl std::fmt::Display) {
        if self.verbose {
            eprintln!("{message}");
        }
    }
}
