//! Pluggable structured extraction.
//!
//! Two strategies, dispatched by variant: `JsonCss` maps a field schema of
//! CSS selectors onto the page and returns JSON records; `Chunked` splits
//! the page text with a [`ChunkingStrategy`] and returns the chunks as a
//! JSON array for downstream consumers (LLM providers live outside this
//! crate and receive these chunks).

mod chunking;

pub use chunking::ChunkingStrategy;

use anyhow::{Result, anyhow};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// One field of a CSS extraction schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub selector: String,
    /// Attribute to read; element text when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

/// A CSS extraction schema: a repeating base selector plus per-record fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonCssSchema {
    pub name: String,
    /// Selector matching one record each.
    pub base_selector: String,
    pub fields: Vec<SchemaField>,
}

/// An extraction strategy, dispatched by variant.
#[derive(Debug, Clone)]
pub enum ExtractionStrategy {
    /// Schema-driven CSS extraction returning a JSON array of records.
    JsonCss(JsonCssSchema),
    /// Chunk the page text and return the chunks as JSON.
    Chunked(ChunkingStrategy),
}

impl ExtractionStrategy {
    /// Extract structured content from `html`. Output is a JSON string.
    pub fn extract(&self, url: &str, html: &str) -> Result<String> {
        match self {
            Self::JsonCss(schema) => extract_json_css(schema, html),
            Self::Chunked(chunking) => {
                let document = Html::parse_document(html);
                let text: String = document
                    .root_element()
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ");
                let chunks = chunking.chunk(&text);
                serde_json::to_string(&serde_json::json!({
                    "url": url,
                    "chunks": chunks,
                }))
                .map_err(Into::into)
            }
        }
    }
}

fn extract_json_css(schema: &JsonCssSchema, html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let base = Selector::parse(&schema.base_selector)
        .map_err(|e| anyhow!("invalid base selector '{}': {e}", schema.base_selector))?;

    let mut field_selectors = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let selector = Selector::parse(&field.selector)
            .map_err(|e| anyhow!("invalid selector '{}' for field '{}': {e}", field.selector, field.name))?;
        field_selectors.push((field, selector));
    }

    let mut records = Vec::new();
    for element in document.select(&base) {
        let mut record = serde_json::Map::new();
        for (field, selector) in &field_selectors {
            let value = element.select(selector).next().map(|matched| {
                match &field.attribute {
                    Some(attr) => matched.value().attr(attr).unwrap_or_default().to_string(),
                    None => matched.text().collect::<String>().trim().to_string(),
                }
            });
            record.insert(
                field.name.clone(),
                value.map_or(serde_json::Value::Null, serde_json::Value::String),
            );
        }
        records.push(serde_json::Value::Object(record));
    }

    serde_json::to_string(&records).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body>
        <div class="item"><h2 class="title">First</h2><a class="link" href="/a">go</a></div>
        <div class="item"><h2 class="title">Second</h2><a class="link" href="/b">go</a></div>
        <div class="item"><h2 class="title">Third</h2></div>
    </body></html>"#;

    fn schema() -> JsonCssSchema {
        JsonCssSchema {
            name: "items".into(),
            base_selector: "div.item".into(),
            fields: vec![
                SchemaField {
                    name: "title".into(),
                    selector: "h2.title".into(),
                    attribute: None,
                },
                SchemaField {
                    name: "href".into(),
                    selector: "a.link".into(),
                    attribute: Some("href".into()),
                },
            ],
        }
    }

    #[test]
    fn css_schema_extracts_records_in_order() {
        let strategy = ExtractionStrategy::JsonCss(schema());
        let json = strategy.extract("https://x.test", LISTING).expect("extract");
        let records: Vec<serde_json::Value> = serde_json::from_str(&json).expect("json");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["title"], "First");
        assert_eq!(records[0]["href"], "/a");
        assert_eq!(records[1]["title"], "Second");
        // Missing fields come through as null, not absent.
        assert!(records[2]["href"].is_null());
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let mut bad = schema();
        bad.base_selector = ":::nope".into();
        let strategy = ExtractionStrategy::JsonCss(bad);
        assert!(strategy.extract("https://x.test", LISTING).is_err());
    }

    #[test]
    fn chunked_strategy_returns_chunks_json() {
        let strategy = ExtractionStrategy::Chunked(ChunkingStrategy::FixedWord { words: 3 });
        let json = strategy
            .extract("https://x.test", "<p>one two three four five</p>")
            .expect("extract");
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        assert_eq!(value["url"], "https://x.test");
        assert_eq!(value["chunks"].as_array().map(Vec::len), Some(2));
    }
}
