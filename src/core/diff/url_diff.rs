//! C2: URL-Set Differ.
//!
//! Classifies each URL discovered for a root target as new/old/existing
//! relative to its historical URL set (§4.2).

use crate::core::model::{DiffedUrl, ProbeResult, UrlDiffResult};
use std::collections::{HashMap, HashSet};

/// Compute the URL-set diff for a single root target.
///
/// `current` is this cycle's probe results for the root target (order not
/// significant; duplicates resolved last-one-wins per §4.2). `historical` is
/// the set of normalized URLs previously seen for this root target, and
/// `last_known` supplies the most recent ProbeResult for a historical URL so
/// "old" entries can carry forward display data.
pub fn diff_urls(
    root_target_url: &str,
    current: &[ProbeResult],
    historical: &HashSet<String>,
    last_known: &HashMap<String, ProbeResult>,
) -> UrlDiffResult {
    // last-one-wins on duplicate input URLs
    let mut by_url: HashMap<String, ProbeResult> = HashMap::new();
    for result in current {
        by_url.insert(result.input_url.clone(), result.clone());
    }

    let mut results = Vec::new();
    let mut new_count = 0;
    let mut old_count = 0;
    let mut existing_count = 0;

    for (url, mut result) in by_url.clone() {
        let status = if historical.contains(&url) {
            existing_count += 1;
            "existing"
        } else {
            new_count += 1;
            "new"
        };
        result.url_status = status.to_string();
        results.push(DiffedUrl { result });
    }

    for url in historical {
        if by_url.contains_key(url) {
            continue;
        }
        old_count += 1;
        let mut synthetic = last_known
            .get(url)
            .cloned()
            .unwrap_or_else(|| placeholder_result(root_target_url, url));
        synthetic.url_status = "old".to_string();
        results.push(DiffedUrl { result: synthetic });
    }

    UrlDiffResult {
        root_target_url: root_target_url.to_string(),
        results,
        new_count,
        old_count,
        existing_count,
        error: None,
    }
}

fn placeholder_result(root_target_url: &str, url: &str) -> ProbeResult {
    ProbeResult {
        input_url: url.to_string(),
        final_url: url.to_string(),
        method: "GET".to_string(),
        timestamp: crate::core::time::local_timestamp_rfc3339(),
        duration_secs: 0.0,
        error: None,
        root_target_url: root_target_url.to_string(),
        status_code: 0,
        content_length: 0,
        content_type: None,
        headers: Default::default(),
        body: None,
        title: None,
        web_server: None,
        ips: Vec::new(),
        cnames: Vec::new(),
        asn: None,
        asn_org: None,
        technologies: Vec::new(),
        tls: None,
        url_status: "old".to_string(),
        oldest_scan_timestamp: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(url: &str) -> ProbeResult {
        ProbeResult {
            status_code: 200,
            ..placeholder_result("http://example.com", url)
        }
    }

    #[test]
    fn new_url_discovery() {
        let current = vec![
            probe("http://example.com/a"),
            probe("http://example.com/b"),
        ];
        let historical = HashSet::new();
        let result = diff_urls("http://example.com", &current, &historical, &HashMap::new());
        assert_eq!(result.new_count, 2);
        assert_eq!(result.old_count, 0);
        assert_eq!(result.existing_count, 0);
        assert!(result.counts_are_consistent());
        assert!(result.results.iter().all(|d| d.result.url_status == "new"));
    }

    #[test]
    fn disappearance() {
        let mut historical = HashSet::new();
        historical.insert("http://example.com/x".to_string());
        historical.insert("http://example.com/y".to_string());
        let current = vec![probe("http://example.com/x")];

        let result = diff_urls("http://example.com", &current, &historical, &HashMap::new());
        assert_eq!(result.new_count, 0);
        assert_eq!(result.existing_count, 1);
        assert_eq!(result.old_count, 1);
        assert!(result.counts_are_consistent());
    }

    #[test]
    fn duplicate_input_last_one_wins() {
        let mut first = probe("http://example.com/a");
        first.status_code = 301;
        let mut second = probe("http://example.com/a");
        second.status_code = 200;
        let current = vec![first, second];
        let result = diff_urls(
            "http://example.com",
            &current,
            &HashSet::new(),
            &HashMap::new(),
        );
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].result.status_code, 200);
    }

    #[test]
    fn counts_invariant_holds_for_any_mix() {
        let mut historical = HashSet::new();
        historical.insert("http://example.com/existing".to_string());
        historical.insert("http://example.com/gone".to_string());
        let current = vec![
            probe("http://example.com/existing"),
            probe("http://example.com/fresh"),
        ];
        let result = diff_urls("http://example.com", &current, &historical, &HashMap::new());
        assert!(result.counts_are_consistent());
    }
}
