//! URL classification and hashing.
//!
//! Every crawl input is one of four kinds: a web URL, a `file://` path, a
//! `raw:` HTML literal, or an internal `cache://` key. The hash of the URL
//! string doubles as the cache key and the content-address prefix for
//! cached artifacts.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::CrawlError;

/// A classified crawl target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlRef {
    /// `http://` or `https://`
    Web(Url),
    /// `file://` absolute path
    LocalFile(PathBuf),
    /// `raw:` followed by literal HTML
    RawHtml(String),
    /// `cache://` followed by a url-hash (internal use)
    Cache(String),
}

impl UrlRef {
    /// Classify a raw URL string.
    ///
    /// Empty input and unknown schemes are configuration errors.
    pub fn parse(input: &str) -> Result<Self, CrawlError> {
        if input.is_empty() {
            return Err(CrawlError::Config("url must not be empty".into()));
        }
        if let Some(html) = input.strip_prefix("raw:") {
            return Ok(Self::RawHtml(html.to_string()));
        }
        if let Some(key) = input.strip_prefix("cache://") {
            return Ok(Self::Cache(key.to_string()));
        }
        if let Some(path) = input.strip_prefix("file://") {
            if path.is_empty() {
                return Err(CrawlError::Config("file:// url has no path".into()));
            }
            return Ok(Self::LocalFile(PathBuf::from(path)));
        }
        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Web(url)),
            Ok(url) => Err(CrawlError::Config(format!(
                "unsupported url scheme '{}' in {input}",
                url.scheme()
            ))),
            Err(e) => Err(CrawlError::Config(format!("invalid url '{input}': {e}"))),
        }
    }

    /// Whether this target requires browser navigation over the network.
    #[must_use]
    pub const fn is_web(&self) -> bool {
        matches!(self, Self::Web(_))
    }
}

/// Stable hash of a URL string, used as cache key and artifact prefix.
#[must_use]
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)
}

/// Stable hash of arbitrary content for content-addressed storage.
#[must_use]
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Resolve `href` against `base`, special-casing the two overwhelmingly
/// common shapes so the full parser only runs for the rest.
#[must_use]
pub fn fast_join(base: &Url, href: &str) -> Option<String> {
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    // Already absolute.
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    // Protocol-relative.
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("{}://{rest}", base.scheme()));
    }
    // Root-relative: same origin, swap the path.
    if href.starts_with('/') {
        let origin = base.origin().ascii_serialization();
        return Some(format!("{origin}{href}"));
    }
    base.join(href).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_all_four_kinds() {
        assert!(matches!(
            UrlRef::parse("https://example.com").unwrap(),
            UrlRef::Web(_)
        ));
        assert!(matches!(
            UrlRef::parse("file:///tmp/page.html").unwrap(),
            UrlRef::LocalFile(_)
        ));
        assert!(matches!(
            UrlRef::parse("raw:<p>hi</p>").unwrap(),
            UrlRef::RawHtml(_)
        ));
        assert!(matches!(
            UrlRef::parse("cache://abc123").unwrap(),
            UrlRef::Cache(_)
        ));
    }

    #[test]
    fn rejects_empty_and_unknown_schemes() {
        assert!(UrlRef::parse("").is_err());
        assert!(UrlRef::parse("ftp://example.com/file").is_err());
        assert!(UrlRef::parse("not a url at all").is_err());
    }

    #[test]
    fn raw_prefix_keeps_literal_html_verbatim() {
        let html = "<html><body><p>Hello</p></body></html>";
        match UrlRef::parse(&format!("raw:{html}")).unwrap() {
            UrlRef::RawHtml(h) => assert_eq!(h, html),
            other => panic!("expected RawHtml, got {other:?}"),
        }
    }

    #[test]
    fn url_hash_is_stable() {
        let a = url_hash("https://example.com/page");
        let b = url_hash("https://example.com/page");
        assert_eq!(a, b);
        assert_ne!(a, url_hash("https://example.com/other"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fast_join_handles_common_shapes() {
        let base = Url::parse("https://example.com/docs/guide/").unwrap();
        assert_eq!(
            fast_join(&base, "/api").as_deref(),
            Some("https://example.com/api")
        );
        assert_eq!(
            fast_join(&base, "//cdn.example.com/x.js").as_deref(),
            Some("https://cdn.example.com/x.js")
        );
        assert_eq!(
            fast_join(&base, "intro").as_deref(),
            Some("https://example.com/docs/guide/intro")
        );
        assert_eq!(
            fast_join(&base, "https://other.test/p").as_deref(),
            Some("https://other.test/p")
        );
        assert_eq!(fast_join(&base, "#section"), None);
        assert_eq!(fast_join(&base, ""), None);
    }
}
