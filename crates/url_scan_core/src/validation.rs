//! Input validation for submitted URLs
//!
//! Bare host names are accepted and treated as `https://` URLs. Anything that
//! still fails to parse as an absolute URL with a host is rejected.

use crate::{Result, ScanError};
use tracing::debug;
use url::Url;

pub const URL_REQUIRED: &str = "URL is required";
pub const INVALID_URL_FORMAT: &str = "Invalid URL format";

/// A validated scan target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    /// Input with the default scheme applied; this is what gets scanned
    pub url: String,
    /// Host name used for the registration lookup
    pub hostname: String,
}

/// Prefix `https://` unless the input already names an http(s) scheme
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Validate raw user input and turn it into a [`ScanTarget`]
pub fn validate_url(input: Option<&str>) -> Result<ScanTarget> {
    let raw = match input.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Err(ScanError::Validation(URL_REQUIRED.to_string())),
    };

    let normalized = normalize_url(raw);
    let parsed = Url::parse(&normalized).map_err(|e| {
        debug!("Rejected URL {:?}: {}", raw, e);
        ScanError::Validation(INVALID_URL_FORMAT.to_string())
    })?;

    let hostname = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => {
            debug!("Rejected URL {:?}: no host", raw);
            return Err(ScanError::Validation(INVALID_URL_FORMAT.to_string()));
        }
    };

    Ok(ScanTarget {
        url: normalized,
        hostname,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validation_message(input: Option<&str>) -> String {
        match validate_url(input) {
            Err(ScanError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_host_gets_https() {
        let target = validate_url(Some("example.com")).unwrap();
        assert_eq!(target.url, "https://example.com");
        assert_eq!(target.hostname, "example.com");
    }

    #[test]
    fn test_bare_and_prefixed_are_equivalent() {
        for host in ["example.com", "sub.example.org", "bad.test", "localhost:8080"] {
            let bare = validate_url(Some(host)).unwrap();
            let prefixed = validate_url(Some(&format!("https://{}", host))).unwrap();
            assert_eq!(bare, prefixed);
        }
    }

    #[test]
    fn test_existing_scheme_is_kept() {
        let target = validate_url(Some("http://bad.test")).unwrap();
        assert_eq!(target.url, "http://bad.test");
        assert_eq!(target.hostname, "bad.test");

        let target = validate_url(Some("HTTPS://Example.com/path?q=1")).unwrap();
        assert_eq!(target.url, "HTTPS://Example.com/path?q=1");
        assert_eq!(target.hostname, "example.com");
    }

    #[test]
    fn test_missing_or_empty_input() {
        assert_eq!(validation_message(None), URL_REQUIRED);
        assert_eq!(validation_message(Some("")), URL_REQUIRED);
        assert_eq!(validation_message(Some("   ")), URL_REQUIRED);
    }

    #[test]
    fn test_malformed_input() {
        assert_eq!(validation_message(Some("not a url")), INVALID_URL_FORMAT);
        assert_eq!(validation_message(Some("https://")), INVALID_URL_FORMAT);
        assert_eq!(validation_message(Some("http://exa mple.com")), INVALID_URL_FORMAT);
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  example.com "), "https://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }
}
