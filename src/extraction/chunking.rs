//! Text chunking strategies.

use serde::{Deserialize, Serialize};

/// Splits flat text into chunks for downstream extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Split on a regex pattern (the pattern is the separator).
    Regex { pattern: String },
    /// Split on sentence boundaries (`.`, `!`, `?` followed by whitespace).
    Sentence,
    /// Fixed-size word windows.
    FixedWord { words: usize },
    /// Overlapping word windows.
    SlidingWindow { words: usize, overlap: usize },
}

impl ChunkingStrategy {
    /// Split `text` into chunks. Empty chunks are never returned.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chunks = match self {
            Self::Regex { pattern } => match regex::Regex::new(pattern) {
                Ok(re) => re.split(text).map(str::to_string).collect(),
                // A bad pattern degrades to one chunk instead of failing the
                // whole extraction.
                Err(_) => vec![text.to_string()],
            },
            Self::Sentence => split_sentences(text),
            Self::FixedWord { words } => window(text, (*words).max(1), 0),
            Self::SlidingWindow { words, overlap } => {
                window(text, (*words).max(1), (*overlap).min(words.saturating_sub(1)))
            }
        };
        chunks
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|n| n.is_whitespace()) {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn window(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let step = size - overlap;
    let mut out = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        out.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    out
}
