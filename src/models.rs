//! Result types shared between the orchestrator, strategies and the cache.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One image, video or audio element kept by the scraper.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub url: String,
    /// Relevance score assigned during extraction; higher is better.
    #[serde(default)]
    pub score: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Media inventory split by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Media {
    pub images: Vec<MediaItem>,
    pub videos: Vec<MediaItem>,
    pub audio: Vec<MediaItem>,
}

/// A single hyperlink with its anchor text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub url: String,
    #[serde(default)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Link inventory split by host relationship to the crawled page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Links {
    pub internal: Vec<Link>,
    pub external: Vec<Link>,
}

/// Structured markdown output of the generator.
///
/// `raw_markdown` is the plain conversion; `markdown_with_citations` has
/// inline links rewritten to `⟨n⟩` markers with `references_markdown`
/// enumerating them; the `fit_*` pair is only populated when a content
/// filter ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarkdownGenerationResult {
    pub raw_markdown: String,
    pub markdown_with_citations: String,
    pub references_markdown: String,
    #[serde(default)]
    pub fit_markdown: String,
    #[serde(default)]
    pub fit_html: String,
}

/// What the crawler strategy hands back to the orchestrator for one URL.
#[derive(Debug, Clone, Default)]
pub struct AsyncCrawlResponse {
    pub html: String,
    pub response_headers: HashMap<String, String>,
    pub status_code: Option<u16>,
    /// Base64 PNG, present when the run config requested a screenshot.
    pub screenshot: Option<String>,
    /// Raw PDF bytes, present when the run config requested a pdf.
    pub pdf: Option<Vec<u8>>,
    pub downloaded_files: Vec<PathBuf>,
    /// JSON-serialized TLS details of the document response, when the run
    /// config asked for the certificate.
    pub ssl_certificate: Option<String>,
    /// Session the page belongs to, when the caller asked for one. Late
    /// content is re-read through the session, never through this struct.
    pub session_id: Option<String>,
}

/// The result of crawling one URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub html: String,
    #[serde(default)]
    pub cleaned_html: String,
    /// Flat markdown kept for older call sites; equals
    /// `markdown_v2.raw_markdown`.
    #[serde(default)]
    pub markdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_v2: Option<MarkdownGenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
    #[serde(default)]
    pub media: Media,
    #[serde(default)]
    pub links: Links,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<Vec<u8>>,
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub downloaded_files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub success: bool,
}

impl CrawlResult {
    /// A failed result carrying only the error message.
    #[must_use]
    pub fn failure(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            error_message: Some(error.into()),
            success: false,
            ..Self::default()
        }
    }
}
