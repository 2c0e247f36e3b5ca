//! Content scraping: raw HTML in, cleaned HTML plus inventories out.
//!
//! The scraper parses once, optionally scopes to a CSS selector, then runs
//! three read passes (metadata, media, links) and a mutate pass (cleaning).
//! Page-level metadata always comes from the full document; inventories and
//! cleaned HTML honor the selector scope.

mod cleaning;
mod links;
mod media;
mod metadata;

pub use cleaning::collapse_redundant_wrappers;

use std::collections::HashMap;

use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use url::Url;

use crate::config::CrawlerRunConfig;
use crate::error::CrawlError;
use crate::models::{Links, Media};

/// Everything the content pipeline derives from one page.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOutput {
    pub cleaned_html: String,
    pub media: Media,
    pub links: Links,
    pub metadata: HashMap<String, String>,
}

/// DOM-based scraping strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebScrapingStrategy;

impl WebScrapingStrategy {
    /// Run the full scraping pass over `html`.
    ///
    /// `base_url` resolves relative references; a configured `css_selector`
    /// that matches nothing is a configuration error.
    pub fn scrape(
        &self,
        html: &str,
        base_url: Option<&Url>,
        config: &CrawlerRunConfig,
    ) -> Result<ScrapeOutput, CrawlError> {
        let document = kuchiki::parse_html().one(html.to_string());

        let metadata = metadata::extract_metadata(&document);

        let scope = match &config.css_selector {
            Some(selector) => scope_to_selector(&document, selector)?,
            // Fragment parsing keeps the whole tree as scope so partial
            // snippets are not collapsed into a synthesized body.
            None if config.parser_kind == crate::config::ParserKind::Fragment => document.clone(),
            None => document
                .select_first("body")
                .ok()
                .map_or_else(|| document.clone(), |body| body.as_node().clone()),
        };

        let media = media::extract_media(&scope, base_url, config);
        let links = links::extract_links(&scope, base_url, config);

        cleaning::clean_tree(&scope, config)?;
        collapse_redundant_wrappers(&scope);

        let cleaned_html = if config.only_text {
            scope.text_contents().split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            let serialized = serialize(&scope)?;
            if config.prettify {
                prettify_html(&serialized)
            } else {
                serialized
            }
        };

        Ok(ScrapeOutput {
            cleaned_html,
            media,
            links,
            metadata,
        })
    }
}

/// Clone every selector match into a fresh subtree that the rest of the
/// pipeline treats as the document body.
fn scope_to_selector(document: &NodeRef, selector: &str) -> Result<NodeRef, CrawlError> {
    let matches = document
        .select(selector)
        .map_err(|()| CrawlError::Config(format!("invalid css selector '{selector}'")))?
        .collect::<Vec<_>>();
    if matches.is_empty() {
        return Err(CrawlError::Config(format!(
            "css selector '{selector}' matched no elements"
        )));
    }
    let mut parts = String::new();
    for matched in matches {
        let mut out = Vec::new();
        if matched.as_node().serialize(&mut out).is_ok() {
            parts.push_str(&String::from_utf8_lossy(&out));
        }
    }
    let fragment = kuchiki::parse_html().one(format!("<body>{parts}</body>"));
    Ok(fragment
        .select_first("body")
        .ok()
        .map_or(fragment.clone(), |body| body.as_node().clone()))
}

/// Light-weight pretty print for human inspection: one tag per line.
fn prettify_html(html: &str) -> String {
    html.replace("><", ">\n<")
}

pub(crate) fn serialize(node: &NodeRef) -> Result<String, CrawlError> {
    let mut out = Vec::new();
    node.serialize(&mut out)
        .map_err(|e| CrawlError::Other(anyhow::anyhow!("serialize failed: {e}")))?;
    String::from_utf8(out)
        .map_err(|e| CrawlError::Other(anyhow::anyhow!("non-utf8 serialization: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrawlerRunConfig {
        CrawlerRunConfig::default()
    }

    fn base() -> Url {
        Url::parse("https://example.com/").expect("test url")
    }

    #[test]
    fn scrape_produces_all_outputs() {
        let html = r#"<html><head><title>T</title></head><body>
            <p>Some paragraph content here</p>
            <a href="/in">internal</a>
            <a href="https://other.test/out">external</a>
            <img src="pic.png" width="300" height="300" alt="a picture">
        </body></html>"#;
        let output = WebScrapingStrategy
            .scrape(html, Some(&base()), &config())
            .expect("scrape");
        assert_eq!(output.metadata.get("title").map(String::as_str), Some("T"));
        assert_eq!(output.links.internal.len(), 1);
        assert_eq!(output.links.external.len(), 1);
        assert_eq!(output.media.images.len(), 1);
        assert!(output.cleaned_html.contains("Some paragraph content"));
    }

    #[test]
    fn selector_scoping_limits_everything_but_metadata() {
        let html = r#"<html><head><title>T</title></head><body>
            <main><p>inside scope</p><a href="/kept">kept</a></main>
            <footer><a href="/dropped">dropped</a></footer>
        </body></html>"#;
        let run_config = CrawlerRunConfig::builder()
            .css_selector("main")
            .build()
            .expect("config");
        let output = WebScrapingStrategy
            .scrape(html, Some(&base()), &run_config)
            .expect("scrape");
        assert_eq!(output.metadata.get("title").map(String::as_str), Some("T"));
        assert_eq!(output.links.internal.len(), 1);
        assert!(output.cleaned_html.contains("inside scope"));
        assert!(!output.cleaned_html.contains("dropped"));
    }

    #[test]
    fn unmatched_selector_is_a_config_error() {
        let run_config = CrawlerRunConfig::builder()
            .css_selector("section.nope")
            .build()
            .expect("config");
        let err = WebScrapingStrategy
            .scrape("<body><p>x</p></body>", Some(&base()), &run_config)
            .expect_err("must fail");
        assert!(err.is_config());
    }

    #[test]
    fn only_text_flattens_markup() {
        let run_config = CrawlerRunConfig::builder().only_text(true).build().expect("config");
        let output = WebScrapingStrategy
            .scrape(
                "<body><p>one</p><p>two words here</p></body>",
                Some(&base()),
                &run_config,
            )
            .expect("scrape");
        assert!(!output.cleaned_html.contains('<'));
        assert!(output.cleaned_html.contains("two words here"));
    }
}
