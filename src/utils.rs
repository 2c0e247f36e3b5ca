//! URL and string helpers shared across the crate.

use url::Url;

/// Extract the registrable host from a URL string, lowercased and with a
/// leading `www.` stripped so `www.example.com` and `example.com` rate-limit
/// together.
#[must_use]
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let normalized = host.strip_prefix("www.").unwrap_or(host);
    if normalized.is_empty() {
        return None;
    }
    Some(normalized.to_lowercase())
}

/// Normalize a URL for equality comparison: drop fragment and query, trim a
/// trailing slash, lowercase the host. Scheme is preserved — http and https
/// are distinct resources.
#[must_use]
pub fn normalize_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path().trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };
    Some(format!("{}://{host}{path}", parsed.scheme()))
}

/// Whether two URLs share a host (used to split internal vs external links).
#[must_use]
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => ha
            .trim_start_matches("www.")
            .eq_ignore_ascii_case(hb.trim_start_matches("www.")),
        _ => false,
    }
}

/// Count whitespace-separated words in a string.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
