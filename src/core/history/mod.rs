//! C1: History Store.
//!
//! Append-only, per-hostname-partitioned columnar store (§4.1). See
//! `segment.rs` for the on-disk format and `manifest.rs` for the active
//! segment index. Concurrency: reads/writes are serialized per hostname by
//! a mutex; different hostnames progress fully in parallel (§5).

pub mod manifest;
pub mod segment;

use manifest::Manifest;
use segment::{HistoryRow, SegmentReadError};

use crate::core::model::{ContentDiffResult, FileHistoryRecord};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("record not found for url {0}")]
    RecordNotFound(String),
    #[error("timestamp for url {url} did not increase monotonically (last={last}, got={got})")]
    NonMonotonicTimestamp { url: String, last: i64, got: i64 },
    #[error("segment error: {0}")]
    Segment(#[from] SegmentReadError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hostname for url: {0}")]
    InvalidHostname(String),
}

impl HistoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HistoryError::Io(_))
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    segment_id: String,
    timestamp_millis: i64,
}

/// Per-hostname write serialization + in-memory latest-record index. The
/// writer mutex and the index `RwLock` are held together across a `Store`
/// so a reader sees either the fully-pre-write or fully-post-write state,
/// never a partial update (§4.1 "Store is atomic with respect to
/// concurrent readers").
struct HostState {
    write_lock: Mutex<()>,
    index: RwLock<HashMap<String, IndexEntry>>,
}

pub struct HistoryStore {
    root: PathBuf,
    manifest: RwLock<Manifest>,
    manifest_lock: Mutex<()>,
    hosts: Mutex<HashMap<String, Arc<HostState>>>,
}

impl HistoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let manifest = Manifest::load(&root)?;
        let store = Self {
            root,
            manifest: RwLock::new(manifest),
            manifest_lock: Mutex::new(()),
            hosts: Mutex::new(HashMap::new()),
        };
        store.rebuild_indexes()?;
        Ok(store)
    }

    fn rebuild_indexes(&self) -> Result<(), HistoryError> {
        let hostnames: Vec<String> = self.manifest.read().unwrap().hostnames().into_iter().collect();
        for hostname in hostnames {
            let host = self.host_state(&hostname);
            let segments = self
                .manifest
                .read()
                .unwrap()
                .segments
                .get(&hostname)
                .cloned()
                .unwrap_or_default();
            let mut index = host.index.write().unwrap();
            for segment_id in segments {
                if let Ok(footer) = segment::load_footer(&self.hostname_dir(&hostname), &segment_id) {
                    for url in footer.url_index_offsets.keys() {
                        // Timestamp refined below by reading the actual latest
                        // row; footer alone only proves presence.
                        index.entry(url.clone()).or_insert(IndexEntry {
                            segment_id: segment_id.clone(),
                            timestamp_millis: i64::MIN,
                        });
                    }
                }
            }
            // Resolve each url's true latest timestamp/segment by scanning
            // segments newest-to-oldest once.
            drop(index);
            self.refresh_host_index(&hostname)?;
        }
        Ok(())
    }

    fn refresh_host_index(&self, hostname: &str) -> Result<(), HistoryError> {
        let host = self.host_state(hostname);
        let segments = self
            .manifest
            .read()
            .unwrap()
            .segments
            .get(hostname)
            .cloned()
            .unwrap_or_default();
        let dir = self.hostname_dir(hostname);
        let mut latest: HashMap<String, IndexEntry> = HashMap::new();
        for segment_id in segments {
            let rows = match segment::read_segment(&dir, &segment_id) {
                Ok(rows) => rows,
                Err(_) => continue, // quarantined / corrupt, skip
            };
            for row in rows {
                let ts = row.timestamp_millis();
                let entry = latest.entry(row.url().to_string()).or_insert(IndexEntry {
                    segment_id: segment_id.clone(),
                    timestamp_millis: ts,
                });
                if ts >= entry.timestamp_millis {
                    *entry = IndexEntry {
                        segment_id: segment_id.clone(),
                        timestamp_millis: ts,
                    };
                }
            }
        }
        *host.index.write().unwrap() = latest;
        Ok(())
    }

    fn hostname_dir(&self, hostname: &str) -> PathBuf {
        self.root.join(sanitize_hostname(hostname))
    }

    fn host_state(&self, hostname: &str) -> Arc<HostState> {
        let mut hosts = self.hosts.lock().unwrap();
        hosts
            .entry(hostname.to_string())
            .or_insert_with(|| {
                Arc::new(HostState {
                    write_lock: Mutex::new(()),
                    index: RwLock::new(HashMap::new()),
                })
            })
            .clone()
    }

    fn hostname_for_url(url: &str) -> Result<String, HistoryError> {
        crate::core::normalize::hostname_of(url)
            .ok_or_else(|| HistoryError::InvalidHostname(url.to_string()))
    }

    /// Commit a single row as its own segment.
    pub fn store(&self, row: HistoryRow) -> Result<(), HistoryError> {
        self.store_batch(&[row])
    }

    /// Commit a batch of rows as one segment (§4.1 storage model: "one
    /// logical segment per batched commit").
    pub fn store_batch(&self, rows: &[HistoryRow]) -> Result<(), HistoryError> {
        if rows.is_empty() {
            return Ok(());
        }
        // All rows in one call are assumed to share a hostname in practice
        // (callers batch per-host); group defensively in case they don't.
        let mut by_host: HashMap<String, Vec<HistoryRow>> = HashMap::new();
        for row in rows {
            let host = Self::hostname_for_url(row.url())?;
            by_host.entry(host).or_default().push(row.clone());
        }
        for (hostname, rows) in by_host {
            self.commit_host_batch(&hostname, rows)?;
        }
        Ok(())
    }

    fn commit_host_batch(&self, hostname: &str, rows: Vec<HistoryRow>) -> Result<(), HistoryError> {
        let host = self.host_state(hostname);
        let _write_guard = host.write_lock.lock().unwrap();

        // Monotonicity check (§3 invariant iii) against the in-memory index.
        {
            let index = host.index.read().unwrap();
            for row in &rows {
                if let Some(entry) = index.get(row.url()) {
                    let ts = row.timestamp_millis();
                    if ts <= entry.timestamp_millis {
                        return Err(HistoryError::NonMonotonicTimestamp {
                            url: row.url().to_string(),
                            last: entry.timestamp_millis,
                            got: ts,
                        });
                    }
                }
            }
        }

        let segment_id = new_segment_id();
        let dir = self.hostname_dir(hostname);
        segment::write_segment(&dir, &segment_id, &rows)?;

        {
            let _m = self.manifest_lock.lock().unwrap();
            let mut manifest = self.manifest.write().unwrap();
            manifest
                .segments
                .entry(hostname.to_string())
                .or_default()
                .push(segment_id.clone());
            manifest.save(&self.root)?;
        }

        {
            let mut index = host.index.write().unwrap();
            for row in &rows {
                index.insert(
                    row.url().to_string(),
                    IndexEntry {
                        segment_id: segment_id.clone(),
                        timestamp_millis: row.timestamp_millis(),
                    },
                );
            }
        }

        Ok(())
    }

    fn is_archived(&self, hostname: &str, url: &str) -> bool {
        self.manifest
            .read()
            .unwrap()
            .archived
            .get(hostname)
            .map(|set| set.contains(url))
            .unwrap_or(false)
    }

    /// Generic "latest row of any kind for this url" lookup.
    pub fn get_latest_record(&self, url: &str) -> Result<Option<HistoryRow>, HistoryError> {
        let hostname = Self::hostname_for_url(url)?;
        if self.is_archived(&hostname, url) {
            return Ok(None);
        }
        let host = self.host_state(&hostname);
        let segment_id = {
            let index = host.index.read().unwrap();
            match index.get(url) {
                Some(e) => e.segment_id.clone(),
                None => return Ok(None),
            }
        };
        let dir = self.hostname_dir(&hostname);
        let rows = segment::read_segment_rows_for_url(&dir, &segment_id, url)?;
        Ok(rows.into_iter().last())
    }

    /// `GetLastKnownRecord`: the most recent `FileHistoryRecord` for `url`.
    pub fn get_last_known_record(&self, url: &str) -> Result<Option<FileHistoryRecord>, HistoryError> {
        match self.get_latest_record(url)? {
            Some(HistoryRow::Content(c)) => Ok(Some(c)),
            _ => Ok(None),
        }
    }

    /// `GetLastKnownHash`.
    pub fn get_last_known_hash(&self, url: &str) -> Result<Option<String>, HistoryError> {
        Ok(self.get_last_known_record(url)?.map(|r| r.content_hash))
    }

    /// `GetRecordsForURL`: full history for `url`, oldest first, optionally
    /// capped to the most recent `limit` records (§8 property 1).
    pub fn get_records_for_url(
        &self,
        url: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let hostname = Self::hostname_for_url(url)?;
        let dir = self.hostname_dir(&hostname);
        let segments = self
            .manifest
            .read()
            .unwrap()
            .segments
            .get(&hostname)
            .cloned()
            .unwrap_or_default();

        let mut collected: Vec<HistoryRow> = Vec::new();
        for segment_id in segments.iter().rev() {
            let mut rows = segment::read_segment_rows_for_url(&dir, segment_id, url)
                .unwrap_or_default();
            rows.reverse(); // newest-first within the segment
            collected.extend(rows);
            if let Some(limit) = limit {
                if collected.len() >= limit {
                    break;
                }
            }
        }
        collected.sort_by_key(|r| r.timestamp_millis());
        if let Some(limit) = limit {
            let start = collected.len().saturating_sub(limit);
            collected = collected[start..].to_vec();
        }
        Ok(collected)
    }

    /// `GetHostnamesWithHistory`.
    pub fn get_hostnames_with_history(&self) -> HashSet<String> {
        self.manifest.read().unwrap().hostnames()
    }

    /// `DeleteOldRecordsForHost`: rewrite the host's segments, dropping rows
    /// older than `older_than_millis`. Implemented by rewriting affected
    /// segments rather than tombstoning (§4.1).
    pub fn delete_old_records_for_host(
        &self,
        hostname: &str,
        older_than_millis: i64,
    ) -> Result<usize, HistoryError> {
        let host = self.host_state(hostname);
        let _write_guard = host.write_lock.lock().unwrap();
        let dir = self.hostname_dir(hostname);

        let segments = self
            .manifest
            .read()
            .unwrap()
            .segments
            .get(hostname)
            .cloned()
            .unwrap_or_default();

        let mut kept: Vec<HistoryRow> = Vec::new();
        let mut removed = 0usize;
        for segment_id in &segments {
            let rows = segment::read_segment(&dir, segment_id).unwrap_or_default();
            for row in rows {
                if row.timestamp_millis() < older_than_millis {
                    removed += 1;
                } else {
                    kept.push(row);
                }
            }
        }

        if removed == 0 {
            return Ok(0);
        }

        // Remove old segment files, write one consolidated replacement.
        for segment_id in &segments {
            let _ = std::fs::remove_file(segment::segment_path(&dir, segment_id));
            let _ = std::fs::remove_file(segment::footer_path(&dir, segment_id));
        }

        {
            let _m = self.manifest_lock.lock().unwrap();
            let mut manifest = self.manifest.write().unwrap();
            manifest.segments.remove(hostname);
            if !kept.is_empty() {
                let segment_id = new_segment_id();
                segment::write_segment(&dir, &segment_id, &kept)?;
                manifest
                    .segments
                    .insert(hostname.to_string(), vec![segment_id]);
            }
            manifest.save(&self.root)?;
        }

        self.refresh_host_index(hostname)?;
        Ok(removed)
    }

    /// `GetAllRecordsWithDiff`: every `FileHistoryRecord` across the whole
    /// store that carries a content diff.
    pub fn get_all_records_with_diff(&self) -> Result<Vec<FileHistoryRecord>, HistoryError> {
        let mut out = Vec::new();
        for hostname in self.get_hostnames_with_history() {
            let dir = self.hostname_dir(&hostname);
            let segments = self
                .manifest
                .read()
                .unwrap()
                .segments
                .get(&hostname)
                .cloned()
                .unwrap_or_default();
            for segment_id in segments {
                if let Ok(rows) = segment::read_segment(&dir, &segment_id) {
                    for row in rows {
                        if let HistoryRow::Content(c) = row {
                            if c.content_diff.is_some() {
                                out.push(c);
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// `GetAllLatestDiffResultsForURLs`: url -> last recorded diff (parsed
    /// out of the latest `FileHistoryRecord.content_diff`), if any.
    pub fn get_all_latest_diff_results_for_urls(
        &self,
        urls: &[String],
    ) -> HashMap<String, Option<ContentDiffResult>> {
        let mut out = HashMap::new();
        for url in urls {
            let diff = self
                .get_last_known_record(url)
                .ok()
                .flatten()
                .and_then(|r| r.content_diff)
                .and_then(|v| serde_json::from_value(v).ok());
            out.insert(url.clone(), diff);
        }
        out
    }

    /// `ArchiveHistory`: mark `url` as archived. Data is retained (readable
    /// via `GetRecordsForURL`); "latest" lookups treat it as having no
    /// active record.
    pub fn archive_history(&self, url: &str) -> Result<(), HistoryError> {
        let hostname = Self::hostname_for_url(url)?;
        let _m = self.manifest_lock.lock().unwrap();
        let mut manifest = self.manifest.write().unwrap();
        manifest
            .archived
            .entry(hostname)
            .or_default()
            .insert(url.to_string());
        manifest.save(&self.root)?;
        Ok(())
    }

    /// Snapshot of every normalized URL seen so far for a root target, for
    /// the URL-Set Differ (§4.2). Approximated as every URL whose history
    /// hostname matches one of the root target's own hostname plus any
    /// previously-probed URL recorded with this `root_target_url`.
    pub fn historical_urls_for_root(
        &self,
        root_target_url: &str,
    ) -> Result<HashSet<String>, HistoryError> {
        let hostname = Self::hostname_for_url(root_target_url)?;
        let dir = self.hostname_dir(&hostname);
        let segments = self
            .manifest
            .read()
            .unwrap()
            .segments
            .get(&hostname)
            .cloned()
            .unwrap_or_default();
        let mut urls = HashSet::new();
        for segment_id in segments {
            if let Ok(rows) = segment::read_segment(&dir, &segment_id) {
                for row in rows {
                    if let HistoryRow::Probe(p) = row {
                        if p.root_target_url == root_target_url {
                            urls.insert(p.input_url.clone());
                        }
                    }
                }
            }
        }
        Ok(urls)
    }

    /// Latest `ProbeResult` per historical URL for a root target, used by
    /// the URL-Set Differ to build "old" entries with last-known display
    /// data.
    pub fn last_known_probe_results_for_root(
        &self,
        root_target_url: &str,
    ) -> Result<HashMap<String, crate::core::model::ProbeResult>, HistoryError> {
        let hostname = Self::hostname_for_url(root_target_url)?;
        let dir = self.hostname_dir(&hostname);
        let segments = self
            .manifest
            .read()
            .unwrap()
            .segments
            .get(&hostname)
            .cloned()
            .unwrap_or_default();
        let mut latest: HashMap<String, crate::core::model::ProbeResult> = HashMap::new();
        for segment_id in segments {
            if let Ok(rows) = segment::read_segment(&dir, &segment_id) {
                for row in rows {
                    if let HistoryRow::Probe(p) = row {
                        if p.root_target_url != root_target_url {
                            continue;
                        }
                        let replace = latest
                            .get(&p.input_url)
                            .map(|existing| existing.timestamp <= p.timestamp)
                            .unwrap_or(true);
                        if replace {
                            latest.insert(p.input_url.clone(), p);
                        }
                    }
                }
            }
        }
        Ok(latest)
    }
}

fn new_segment_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn sanitize_hostname(hostname: &str) -> String {
    hostname.replace([':', '/'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::FileHistoryRecord;
    use tempfile::tempdir;

    fn content(url: &str, ts: i64, hash: &str) -> HistoryRow {
        HistoryRow::Content(FileHistoryRecord {
            url: url.to_string(),
            timestamp: ts,
            content_hash: hash.to_string(),
            content_type: Some("text/plain".to_string()),
            content: Some(b"body".to_vec()),
            etag: None,
            last_modified: None,
            content_diff: None,
            extracted_paths: None,
        })
    }

    #[test]
    fn store_then_get_latest_round_trips_hash() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.store(content("http://example.com/app.js", 1, "abc")).unwrap();
        let latest = store.get_last_known_record("http://example.com/app.js").unwrap().unwrap();
        assert_eq!(latest.content_hash, "abc");
    }

    #[test]
    fn records_ordered_ascending_by_timestamp() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.store(content("http://example.com/app.js", 1, "a")).unwrap();
        store.store(content("http://example.com/app.js", 2, "b")).unwrap();
        store.store(content("http://example.com/app.js", 3, "c")).unwrap();

        let records = store.get_records_for_url("http://example.com/app.js", None).unwrap();
        let hashes: Vec<String> = records
            .into_iter()
            .map(|r| match r {
                HistoryRow::Content(c) => c.content_hash,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(hashes, vec!["a", "b", "c"]);
    }

    #[test]
    fn rejects_non_monotonic_timestamp() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.store(content("http://example.com/app.js", 5, "a")).unwrap();
        let err = store.store(content("http://example.com/app.js", 4, "b")).unwrap_err();
        assert!(matches!(err, HistoryError::NonMonotonicTimestamp { .. }));
    }

    #[test]
    fn reopening_rebuilds_index_from_manifest() {
        let dir = tempdir().unwrap();
        {
            let store = HistoryStore::open(dir.path()).unwrap();
            store.store(content("http://example.com/app.js", 1, "a")).unwrap();
        }
        let reopened = HistoryStore::open(dir.path()).unwrap();
        let hash = reopened.get_last_known_hash("http://example.com/app.js").unwrap();
        assert_eq!(hash, Some("a".to_string()));
    }

    #[test]
    fn delete_old_records_prunes_and_keeps_recent() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.store(content("http://example.com/a", 1, "old")).unwrap();
        store.store(content("http://example.com/b", 1000, "new")).unwrap();

        let removed = store.delete_old_records_for_host("example.com", 500).unwrap();
        assert_eq!(removed, 1);
        let remaining = store.get_records_for_url("http://example.com/b", None).unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn archived_url_has_no_latest_record() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.store(content("http://example.com/a", 1, "x")).unwrap();
        store.archive_history("http://example.com/a").unwrap();
        assert!(store.get_last_known_record("http://example.com/a").unwrap().is_none());
        // history is retained
        assert_eq!(store.get_records_for_url("http://example.com/a", None).unwrap().len(), 1);
    }

    #[test]
    fn different_hostnames_have_independent_history() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.store(content("http://a.example.com/x", 1, "a")).unwrap();
        store.store(content("http://b.example.com/x", 1, "b")).unwrap();
        assert_eq!(
            store.get_hostnames_with_history(),
            ["a.example.com", "b.example.com"].into_iter().map(String::from).collect()
        );
    }
}
