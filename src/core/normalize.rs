//! C9: URL Normalizer.
//!
//! Deterministic canonicalization of a raw URL string (§4.9). Grounded in
//! the teacher's `proxy_health::url` module (same reliance on the `url`
//! crate and a `thiserror` error enum), generalized from "build a health
//! check URL" to "canonicalize any target/resource URL".

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlValidationError {
    #[error("url is empty")]
    Empty,
    #[error("url parses to bare scheme only")]
    SchemeOnly,
    #[error("url could not be parsed: {0}")]
    ParseError(String),
}

/// Canonicalize a raw URL string per §4.9:
/// 1. trim whitespace, reject empty
/// 2. default scheme to `http://` when absent
/// 3. lowercase scheme and host (host includes port)
/// 4. drop fragment
/// 5. reject a result that normalizes to bare `scheme://`
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> Result<String, UrlValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    let mut parsed = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(e) => {
            if trimmed.contains("://") {
                if e == url::ParseError::EmptyHost {
                    return Err(UrlValidationError::SchemeOnly);
                }
                return Err(UrlValidationError::ParseError(e.to_string()));
            }
            let with_scheme = format!("http://{}", trimmed);
            Url::parse(&with_scheme)
                .map_err(|e| UrlValidationError::ParseError(e.to_string()))?
        }
    };

    parsed.set_fragment(None);

    let scheme = parsed.scheme().to_ascii_lowercase();
    parsed
        .set_scheme(&scheme)
        .map_err(|_| UrlValidationError::ParseError("invalid scheme".to_string()))?;

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_ascii_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| UrlValidationError::ParseError(e.to_string()))?;
    }

    let canonical = parsed.to_string();
    let bare_scheme = format!("{}://", scheme);
    if canonical == bare_scheme || canonical == format!("{}/", bare_scheme) {
        return Err(UrlValidationError::SchemeOnly);
    }

    Ok(canonical)
}

/// Extract the lowercase hostname (with port, if non-default) from an
/// already-normalized URL. Used by the History Store to partition segments
/// by hostname.
pub fn hostname_of(normalized_url: &str) -> Option<String> {
    let parsed = Url::parse(normalized_url).ok()?;
    parsed.host_str().map(|h| {
        if let Some(port) = parsed.port() {
            format!("{}:{}", h, port)
        } else {
            h.to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent() {
        let once = normalize("HTTP://Example.com/Path?Q=1#f").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn lowercases_scheme_and_host_preserves_path_case() {
        let out = normalize("HTTP://Example.com/Path?Q=1#f").unwrap();
        assert_eq!(out, "http://example.com/Path?Q=1");
    }

    #[test]
    fn defaults_missing_scheme() {
        let out = normalize("example.com/a").unwrap();
        assert_eq!(out, "http://example.com/a");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(normalize("   "), Err(UrlValidationError::Empty));
    }

    #[test]
    fn rejects_scheme_only() {
        assert_eq!(normalize("http://"), Err(UrlValidationError::SchemeOnly));
    }

    #[test]
    fn drops_fragment() {
        assert_eq!(
            normalize("https://example.com/a#section").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn hostname_includes_port() {
        let u = normalize("http://Example.com:8080/x").unwrap();
        assert_eq!(hostname_of(&u).unwrap(), "example.com:8080");
    }
}
