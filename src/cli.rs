//! CLI surface (§6): mode-selecting flags, clap derive per the teacher's
//! `cli.rs`.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Onetime,
    Automated,
}

#[derive(Parser, Debug)]
#[command(name = "monsterinc")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "HTTP reconnaissance and change-monitoring engine")]
pub struct Cli {
    /// Orchestrator mode.
    #[arg(long = "mode", value_enum, default_value = "onetime")]
    pub mode: Mode,

    /// File of one URL per line; blank lines skipped.
    #[arg(long = "targets")]
    pub targets: Option<PathBuf>,

    /// Configuration file path.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Automated mode only.
    #[arg(long = "cycle-minutes")]
    pub cycle_minutes: Option<u64>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Read `path`, skipping blank lines, per §6's target-file contract.
pub fn read_targets(path: &std::path::Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_targets_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.txt");
        std::fs::write(&path, "http://a.example.com\n\n  \nhttp://b.example.com\n").unwrap();
        let targets = read_targets(&path).unwrap();
        assert_eq!(targets, vec!["http://a.example.com", "http://b.example.com"]);
    }
}
