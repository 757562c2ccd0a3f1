//! Manifest: `<history_root>/manifest.json` lists active segment IDs per
//! hostname (§6). Writes use the teacher's temp-file-then-rename pattern
//! (`core::network::http_monitor::write_state_atomic`) so a crash never
//! leaves a partially-written manifest.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// hostname -> ordered list of segment ids, oldest first.
    pub segments: HashMap<String, Vec<String>>,
    /// hostname -> set of URLs marked archived via `ArchiveHistory`.
    #[serde(default)]
    pub archived: HashMap<String, HashSet<String>>,
}

impl Manifest {
    pub fn load(root: &Path) -> std::io::Result<Self> {
        let path = manifest_path(root);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, root: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(root)?;
        let path = manifest_path(root);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn hostnames(&self) -> HashSet<String> {
        self.segments.keys().cloned().collect()
    }
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join("manifest.json")
}
