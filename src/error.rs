//! Error taxonomy for crawl operations.
//!
//! Errors are grouped the way the orchestrator reacts to them: configuration
//! and hook errors are caller bugs, navigation errors are per-URL failures,
//! rendering errors are usually downgraded to warnings, and cache errors are
//! never fatal to a crawl.

use std::panic::Location;

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Invalid configuration supplied by the caller (bad selector, unknown
    /// URL scheme, conflicting cache flags). Not retryable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Navigation-level failure: timeout, TLS, DNS, HTTP error status.
    #[error("navigation error: {0}")]
    Navigation(String),

    /// Rendering failure that the caller asked to treat as fatal
    /// (e.g. body never became visible with `ignore_body_visibility=false`).
    #[error("rendering error: {0}")]
    Rendering(String),

    /// Browser/CDP-level failure (launch, connect, closed page).
    #[error("browser error: {0}")]
    Browser(String),

    /// Cache-store failure. Callers treat this as a cache miss.
    #[error("cache error: {0}")]
    Cache(String),

    /// A user hook returned an error; propagates as a crawl failure.
    #[error("hook '{hook}' failed: {message}")]
    Hook { hook: &'static str, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// Whether this error class is a caller bug rather than an environmental
    /// failure.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T, E = CrawlError> = std::result::Result<T, E>;

/// Number of source lines included on each side of a failure site.
const CONTEXT_LINES: usize = 5;

/// Format an error with its call-site location and a short source excerpt.
///
/// The excerpt is best effort: when the crate source is not readable at
/// runtime (installed binary, stripped container) only the
/// `file:line:function` prefix survives. Secrets never appear here because
/// the excerpt is source text, not captured values.
#[track_caller]
#[must_use]
pub fn error_context(function: &str, error: &dyn std::fmt::Display) -> String {
    let loc = Location::caller();
    let mut out = format!("{error} (at {}:{} in {function})", loc.file(), loc.line());
    if let Some(excerpt) = source_excerpt(loc.file(), loc.line() as usize) {
        out.push('\n');
        out.push_str(&excerpt);
    }
    out
}

fn source_excerpt(file: &str, line: usize) -> Option<String> {
    let text = std::fs::read_to_string(file).ok()?;
    let lines: Vec<&str> = text.lines().collect();
    if line == 0 || line > lines.len() {
        return None;
    }
    let start = line.saturating_sub(CONTEXT_LINES + 1);
    let end = (line + CONTEXT_LINES).min(lines.len());
    let mut excerpt = String::new();
    for (idx, src) in lines[start..end].iter().enumerate() {
        let n = start + idx + 1;
        let marker = if n == line { ">>" } else { "  " };
        excerpt.push_str(&format!("{marker} {n:4} | {src}\n"));
    }
    Some(excerpt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_flagged() {
        let err = CrawlError::Config("bad selector".into());
        assert!(err.is_config());
        assert!(!CrawlError::Navigation("timeout".into()).is_config());
    }

    #[test]
    fn error_context_includes_location() {
        let msg = error_context("tests::error_context_includes_location", &"boom");
        assert!(msg.contains("boom"));
        assert!(msg.contains("error.rs"));
    }

    #[test]
    fn source_excerpt_marks_failing_line() {
        // Readable while tests run from the crate root; None elsewhere.
        let excerpt = source_excerpt("src/error.rs", 10);
        if let Some(text) = excerpt {
            assert!(text.contains(">>"));
        }
    }
}
