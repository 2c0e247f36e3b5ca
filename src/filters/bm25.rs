//! BM25 relevance filtering.
//!
//! The page body is split into ordered chunks along block boundaries, each
//! chunk is scored with BM25 against a query, and chunks above the threshold
//! are reassembled in original order. The query comes from the caller, or is
//! assembled from the page's own title/description/keywords meta when none
//! is supplied.

use std::collections::HashMap;

use anyhow::Result;
use scraper::{Html, Selector};
use std::sync::LazyLock;

/// BM25 tuning constants (standard Robertson defaults).
const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Block-level tags that delimit chunks.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "li", "blockquote", "pre", "td", "h1", "h2", "h3", "h4",
    "h5", "h6",
];

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("'title' is a valid selector"));
static META_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta").expect("'meta' is a valid selector"));

/// BM25-based content filter.
#[derive(Debug, Clone)]
pub struct Bm25Filter {
    /// Caller-supplied query; page-derived when `None`.
    query: Option<String>,
    /// Minimum BM25 score for a chunk to survive.
    score_threshold: f64,
}

impl Default for Bm25Filter {
    fn default() -> Self {
        Self {
            query: None,
            score_threshold: 1.0,
        }
    }
}

impl Bm25Filter {
    #[must_use]
    pub fn new(query: Option<String>, score_threshold: f64) -> Self {
        Self {
            query,
            score_threshold,
        }
    }

    /// Keep the chunks of `html` that score above the threshold.
    pub fn filter(&self, html: &str) -> Result<String> {
        let document = Html::parse_document(html);
        let query = match &self.query {
            Some(q) if !q.trim().is_empty() => q.clone(),
            _ => page_query(&document),
        };
        let query_terms = tokenize(&query);
        if query_terms.is_empty() {
            // Nothing to rank against; the filter keeps everything.
            return Ok(html.to_string());
        }

        let chunks = extract_chunks(&document);
        if chunks.is_empty() {
            return Ok(String::new());
        }

        let scored = score_chunks(&chunks, &query_terms);
        let kept: Vec<&str> = chunks
            .iter()
            .zip(scored.iter())
            .filter(|(_, score)| **score >= self.score_threshold)
            .map(|(chunk, _)| chunk.html.as_str())
            .collect();

        Ok(kept.join("\n"))
    }
}

#[derive(Debug)]
struct Chunk {
    html: String,
    terms: Vec<String>,
}

/// Ordered block-level text chunks; a descendant walk keeps document order
/// and pure containers are skipped so nested blocks contribute only once.
fn extract_chunks(document: &Html) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for node in document.root_element().descendants() {
        let Some(element) = scraper::ElementRef::wrap(node) else {
            continue;
        };
        if !BLOCK_TAGS.contains(&element.value().name()) {
            continue;
        }
        let own_words = element
            .children()
            .filter_map(|c| c.value().as_text().map(|t| t.to_string()))
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .count();
        let full_text: String = element.text().collect::<Vec<_>>().join(" ");
        let full_words = full_text.split_whitespace().count();
        // Containers whose text lives in nested blocks defer to them.
        if own_words < 3 && full_words > own_words {
            continue;
        }
        let terms = tokenize(&full_text);
        if terms.is_empty() {
            continue;
        }
        chunks.push(Chunk {
            html: element.html(),
            terms,
        });
    }
    chunks
}

/// Classic BM25 over the chunk collection.
fn score_chunks(chunks: &[Chunk], query_terms: &[String]) -> Vec<f64> {
    let n = chunks.len() as f64;
    let avg_len: f64 = chunks.iter().map(|c| c.terms.len() as f64).sum::<f64>() / n;

    // Document frequency per query term.
    let mut df: HashMap<&str, f64> = HashMap::new();
    for term in query_terms {
        let count = chunks
            .iter()
            .filter(|c| c.terms.iter().any(|t| t == term))
            .count() as f64;
        df.insert(term.as_str(), count);
    }

    chunks
        .iter()
        .map(|chunk| {
            let len = chunk.terms.len() as f64;
            query_terms
                .iter()
                .map(|term| {
                    let tf = chunk.terms.iter().filter(|t| *t == term).count() as f64;
                    if tf == 0.0 {
                        return 0.0;
                    }
                    let df = df.get(term.as_str()).copied().unwrap_or(0.0);
                    let idf = (((n - df + 0.5) / (df + 0.5)) + 1.0).ln();
                    idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * len / avg_len))
                })
                .sum()
        })
        .collect()
}

/// Query assembled from title, meta description and meta keywords.
fn page_query(document: &Html) -> String {
    let mut parts = Vec::new();
    if let Some(title) = document.select(&TITLE_SELECTOR).next() {
        parts.push(title.text().collect::<String>());
    }
    for meta in document.select(&META_SELECTOR) {
        let name = meta.value().attr("name").unwrap_or_default();
        if matches!(name, "description" | "keywords")
            && let Some(content) = meta.value().attr("content")
        {
            parts.push(content.to_string());
        }
    }
    parts.join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .collect()
}
