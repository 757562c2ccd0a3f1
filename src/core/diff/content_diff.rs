//! C3: Content Differ.
//!
//! Line-oriented diff between two fetches of the same URL, producing an
//! operation list plus summary statistics (§4.3). Binary content types
//! short-circuit on hash equality rather than attempting a line diff.
//!
//! The algorithm is a classic Myers O(ND) edit-script search (Eugene Myers,
//! "An O(ND) Difference Algorithm and Its Variations", 1986) implemented
//! directly rather than pulled in as a dependency -- no diff crate appears
//! anywhere in the teacher's or the example pack's dependency tables, and
//! the algorithm is small and self-contained enough not to warrant one.

use crate::core::model::{ContentDiffOp, ContentDiffResult, DiffOpKind};
use sha2::{Digest, Sha256};

const BINARY_CONTENT_TYPES: &[&str] = &[
    "image/", "audio/", "video/", "font/", "application/octet-stream",
    "application/zip", "application/pdf", "application/gzip",
];

pub fn is_binary_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let lower = ct.to_ascii_lowercase();
            BINARY_CONTENT_TYPES.iter().any(|p| lower.starts_with(p))
        }
        None => false,
    }
}

pub fn hash_body(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Diff two blobs. Deterministic: same inputs produce byte-identical output
/// across runs (§8 property 4).
pub fn diff(
    old: &[u8],
    new: &[u8],
    content_type: Option<&str>,
) -> ContentDiffResult {
    let start = std::time::Instant::now();
    let old_hash = hash_body(old);
    let new_hash = hash_body(new);

    if is_binary_content_type(content_type) {
        let identical = old_hash == new_hash;
        return ContentDiffResult {
            timestamp: crate::core::time::epoch_millis(),
            content_type: content_type.map(|s| s.to_string()),
            operations: Vec::new(),
            lines_added: 0,
            lines_deleted: 0,
            identical,
            error: None,
            processing_duration_ms: start.elapsed().as_millis() as u64,
            old_hash,
            new_hash,
            extracted_paths: Vec::new(),
        };
    }

    let old_text = String::from_utf8_lossy(old);
    let new_text = String::from_utf8_lossy(new);
    let old_lines: Vec<&str> = split_lines(&old_text);
    let new_lines: Vec<&str> = split_lines(&new_text);

    let ops = myers_diff(&old_lines, &new_lines);
    let operations = collapse_runs(ops);

    let lines_added = operations
        .iter()
        .filter(|o| o.kind == DiffOpKind::Insert)
        .map(|o| o.text.lines().count())
        .sum();
    let lines_deleted = operations
        .iter()
        .filter(|o| o.kind == DiffOpKind::Delete)
        .map(|o| o.text.lines().count())
        .sum();
    let identical = lines_added == 0 && lines_deleted == 0;

    ContentDiffResult {
        timestamp: crate::core::time::epoch_millis(),
        content_type: content_type.map(|s| s.to_string()),
        operations,
        lines_added,
        lines_deleted,
        identical,
        error: None,
        processing_duration_ms: start.elapsed().as_millis() as u64,
        old_hash,
        new_hash,
        extracted_paths: Vec::new(),
    }
}

fn split_lines(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.lines().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawOp {
    Equal,
    Insert,
    Delete,
}

/// Myers O(ND) shortest edit script between two line sequences, expressed as
/// a flat per-line op list (pre-collapse). `O(|old| + |new|)` auxiliary
/// storage: the trace keeps one `Vec<i32>` per round plus the final path.
fn myers_diff<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(RawOp, &'a str)> {
    let n = old.len() as i32;
    let m = new.len() as i32;
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }

    let offset = max as usize;
    let mut v = vec![0i32; 2 * max as usize + 1];
    let mut trace: Vec<Vec<i32>> = Vec::new();

    let mut found_d = max;
    'outer: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset as i32) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;

            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }

            v[idx] = x;

            if x >= n && y >= m {
                found_d = d;
                break 'outer;
            }
            k += 2;
        }
    }

    // Backtrack through the trace to recover the edit script. `trace[d]`
    // holds the v-array as it was *before* round d ran (i.e. round d-1's
    // result), which is exactly what's needed to tell whether the move into
    // round d's endpoint was an insert or a delete.
    let mut ops: Vec<(RawOp, &str)> = Vec::new();
    let mut x = n;
    let mut y = m;
    for d in (0..=found_d).rev() {
        let v = &trace[d as usize];
        let k = x - y;
        let idx = (k + offset as i32) as usize;

        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_idx = (prev_k + offset as i32) as usize;
        let prev_x = v[prev_idx];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push((RawOp::Equal, old[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }

        if d > 0 {
            if x == prev_x {
                ops.push((RawOp::Insert, new[(y - 1) as usize]));
                y -= 1;
            } else {
                ops.push((RawOp::Delete, old[(x - 1) as usize]));
                x -= 1;
            }
        }
    }

    ops.reverse();
    ops
}

/// Collapse consecutive equal-kind ops into a single `ContentDiffOp`, so long
/// runs of unchanged lines compress to one `Equal` operation.
fn collapse_runs(ops: Vec<(RawOp, &str)>) -> Vec<ContentDiffOp> {
    let mut out: Vec<ContentDiffOp> = Vec::new();
    for (op, line) in ops {
        let kind = match op {
            RawOp::Equal => DiffOpKind::Equal,
            RawOp::Insert => DiffOpKind::Insert,
            RawOp::Delete => DiffOpKind::Delete,
        };
        match out.last_mut() {
            Some(last) if last.kind == kind => {
                last.text.push('\n');
                last.text.push_str(line);
            }
            _ => out.push(ContentDiffOp {
                kind,
                text: line.to_string(),
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_blobs_yield_no_changes() {
        let body = b"line one\nline two\nline three";
        let result = diff(body, body, Some("text/plain"));
        assert!(result.identical);
        assert_eq!(result.lines_added, 0);
        assert_eq!(result.lines_deleted, 0);
        assert_eq!(result.old_hash, result.new_hash);
    }

    #[test]
    fn detects_insertions_and_deletions() {
        let old = b"a\nb\nc";
        let new = b"a\nx\nc\nd";
        let result = diff(old, new, Some("text/plain"));
        assert!(!result.identical);
        assert_eq!(result.lines_added, 2); // x, d
        assert_eq!(result.lines_deleted, 1); // b
    }

    #[test]
    fn counts_lines_not_collapsed_ops_in_a_run() {
        let old = b"a\nb";
        let new = b"a\nx\ny\nz\nb";
        let result = diff(old, new, Some("text/plain"));
        assert!(!result.identical);
        assert_eq!(result.lines_added, 3); // x, y, z collapse into one op
        assert_eq!(result.lines_deleted, 0);
    }

    #[test]
    fn deterministic_across_runs() {
        let old = b"alpha\nbeta\ngamma\ndelta";
        let new = b"alpha\nBETA\ngamma\ndelta\nepsilon";
        let first = diff(old, new, Some("text/plain"));
        let second = diff(old, new, Some("text/plain"));
        assert_eq!(
            serde_json::to_string(&first.operations).unwrap(),
            serde_json::to_string(&second.operations).unwrap()
        );
    }

    #[test]
    fn binary_content_short_circuits_on_hash() {
        let old = vec![0u8, 1, 2, 3];
        let new = vec![0u8, 1, 2, 4];
        let result = diff(&old, &new, Some("image/png"));
        assert!(!result.identical);
        assert!(result.operations.is_empty());
    }

    #[test]
    fn binary_identical_hash_marks_identical() {
        let body = vec![9u8; 16];
        let result = diff(&body, &body, Some("application/octet-stream"));
        assert!(result.identical);
        assert!(result.operations.is_empty());
    }
}
