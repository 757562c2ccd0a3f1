//! Columnar segment format (§D in SPEC_FULL.md, §6 in spec.md).
//!
//! Each segment is a gzip-compressed JSONL file (one `HistoryRow` per line)
//! with a sidecar footer carrying `{row_count, url_index_offsets, checksum}`.
//! Grounded in the teacher's `debug_logger.rs` rotation path, which already
//! gzips rotated log files with `flate2`; here every segment is written
//! compressed from the start rather than compressed after the fact.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::core::model::{FileHistoryRecord, ProbeResult};

/// A single stored row. Deliberately a plain tagged enum rather than a
/// trait object -- per Design Notes §9, the store is generic over "a row
/// with a url and a timestamp", not over an `Identifiable`/`Timestamped`
/// interface hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum HistoryRow {
    Probe(ProbeResult),
    Content(FileHistoryRecord),
}

impl HistoryRow {
    pub fn url(&self) -> &str {
        match self {
            HistoryRow::Probe(p) => &p.input_url,
            HistoryRow::Content(c) => &c.url,
        }
    }

    /// Epoch milliseconds, used for the strictly-increasing-timestamp
    /// invariant (§3 invariant iii).
    pub fn timestamp_millis(&self) -> i64 {
        match self {
            HistoryRow::Probe(p) => chrono::DateTime::parse_from_rfc3339(&p.timestamp)
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(0),
            HistoryRow::Content(c) => c.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentFooter {
    pub row_count: usize,
    /// url -> byte offsets (within the *decompressed* JSONL body) of each
    /// line belonging to that url, in file order.
    pub url_index_offsets: HashMap<String, Vec<u64>>,
    /// SHA-256 hex digest of the decompressed JSONL body.
    pub checksum: String,
}

pub fn segment_path(hostname_dir: &Path, segment_id: &str) -> PathBuf {
    hostname_dir.join(format!("{segment_id}.seg.gz"))
}

pub fn footer_path(hostname_dir: &Path, segment_id: &str) -> PathBuf {
    hostname_dir.join(format!("{segment_id}.footer.json"))
}

/// Serialize rows to JSONL, gzip-compress, and write both the segment and
/// its footer. Returns the footer for the caller to fold into the index.
pub fn write_segment(
    hostname_dir: &Path,
    segment_id: &str,
    rows: &[HistoryRow],
) -> std::io::Result<SegmentFooter> {
    std::fs::create_dir_all(hostname_dir)?;

    let mut body = Vec::new();
    let mut url_index_offsets: HashMap<String, Vec<u64>> = HashMap::new();
    for row in rows {
        let offset = body.len() as u64;
        url_index_offsets
            .entry(row.url().to_string())
            .or_default()
            .push(offset);
        let line = serde_json::to_string(row)?;
        body.extend_from_slice(line.as_bytes());
        body.push(b'\n');
    }

    let mut hasher = Sha256::new();
    hasher.update(&body);
    let checksum = hex_encode(&hasher.finalize());

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body)?;
    let compressed = encoder.finish()?;

    std::fs::write(segment_path(hostname_dir, segment_id), compressed)?;

    let footer = SegmentFooter {
        row_count: rows.len(),
        url_index_offsets,
        checksum,
    };
    std::fs::write(
        footer_path(hostname_dir, segment_id),
        serde_json::to_string_pretty(&footer)?,
    )?;

    Ok(footer)
}

#[derive(Debug, thiserror::Error)]
pub enum SegmentReadError {
    #[error("segment {0} is corrupt (checksum mismatch)")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read and validate a whole segment, returning its rows in file order.
/// A checksum mismatch quarantines the segment (renamed with a `.corrupt`
/// suffix) so it's never mistaken for valid data again, and the read fails
/// with `SegmentReadError::Corrupt`.
pub fn read_segment(hostname_dir: &Path, segment_id: &str) -> Result<Vec<HistoryRow>, SegmentReadError> {
    let body = decompress_and_verify(hostname_dir, segment_id)?;
    parse_rows(&body)
}

/// Read only the rows for `url`, using the footer's offset index to avoid
/// reparsing the whole segment when it holds many unrelated URLs.
pub fn read_segment_rows_for_url(
    hostname_dir: &Path,
    segment_id: &str,
    url: &str,
) -> Result<Vec<HistoryRow>, SegmentReadError> {
    let footer = load_footer(hostname_dir, segment_id)?;
    let Some(offsets) = footer.url_index_offsets.get(url) else {
        return Ok(Vec::new());
    };
    let body = decompress_and_verify(hostname_dir, segment_id)?;
    let mut rows = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        let slice = &body[offset as usize..];
        let end = slice.iter().position(|&b| b == b'\n').unwrap_or(slice.len());
        let row: HistoryRow = serde_json::from_slice(&slice[..end])?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn load_footer(hostname_dir: &Path, segment_id: &str) -> Result<SegmentFooter, SegmentReadError> {
    let content = std::fs::read_to_string(footer_path(hostname_dir, segment_id))?;
    Ok(serde_json::from_str(&content)?)
}

fn decompress_and_verify(hostname_dir: &Path, segment_id: &str) -> Result<Vec<u8>, SegmentReadError> {
    let footer = load_footer(hostname_dir, segment_id)?;
    let compressed = std::fs::read(segment_path(hostname_dir, segment_id))?;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut body = Vec::new();
    decoder.read_to_end(&mut body)?;

    let mut hasher = Sha256::new();
    hasher.update(&body);
    let checksum = hex_encode(&hasher.finalize());
    if checksum != footer.checksum {
        quarantine(hostname_dir, segment_id);
        return Err(SegmentReadError::Corrupt(segment_id.to_string()));
    }
    Ok(body)
}

fn quarantine(hostname_dir: &Path, segment_id: &str) {
    let _ = std::fs::rename(
        segment_path(hostname_dir, segment_id),
        segment_path(hostname_dir, segment_id).with_extension("gz.corrupt"),
    );
    let _ = std::fs::rename(
        footer_path(hostname_dir, segment_id),
        footer_path(hostname_dir, segment_id).with_extension("json.corrupt"),
    );
}

fn parse_rows(body: &[u8]) -> Result<Vec<HistoryRow>, SegmentReadError> {
    let mut rows = Vec::new();
    for line in body.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        rows.push(serde_json::from_slice(line)?);
    }
    Ok(rows)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn content_row(url: &str, ts: i64, hash: &str) -> HistoryRow {
        HistoryRow::Content(FileHistoryRecord {
            url: url.to_string(),
            timestamp: ts,
            content_hash: hash.to_string(),
            content_type: Some("text/plain".to_string()),
            content: Some(b"hello".to_vec()),
            etag: None,
            last_modified: None,
            content_diff: None,
            extracted_paths: None,
        })
    }

    #[test]
    fn round_trips_rows() {
        let dir = tempdir().unwrap();
        let rows = vec![
            content_row("http://a.example.com/x", 1, "h1"),
            content_row("http://a.example.com/y", 2, "h2"),
        ];
        write_segment(dir.path(), "seg-1", &rows).unwrap();
        let read_back = read_segment(dir.path(), "seg-1").unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].url(), "http://a.example.com/x");
    }

    #[test]
    fn detects_corruption() {
        let dir = tempdir().unwrap();
        let rows = vec![content_row("http://a.example.com/x", 1, "h1")];
        write_segment(dir.path(), "seg-1", &rows).unwrap();

        // Tamper with the footer checksum.
        let mut footer = load_footer(dir.path(), "seg-1").unwrap();
        footer.checksum = "deadbeef".to_string();
        std::fs::write(
            footer_path(dir.path(), "seg-1"),
            serde_json::to_string(&footer).unwrap(),
        )
        .unwrap();

        let err = read_segment(dir.path(), "seg-1").unwrap_err();
        assert!(matches!(err, SegmentReadError::Corrupt(_)));
        assert!(segment_path(dir.path(), "seg-1")
            .with_extension("gz.corrupt")
            .exists());
    }

    #[test]
    fn offset_index_reads_only_target_url() {
        let dir = tempdir().unwrap();
        let rows = vec![
            content_row("http://a.example.com/x", 1, "h1"),
            content_row("http://a.example.com/y", 2, "h2"),
            content_row("http://a.example.com/x", 3, "h3"),
        ];
        write_segment(dir.path(), "seg-1", &rows).unwrap();
        let xs = read_segment_rows_for_url(dir.path(), "seg-1", "http://a.example.com/x").unwrap();
        assert_eq!(xs.len(), 2);
    }
}
