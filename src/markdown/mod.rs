//! HTML to Markdown generation with link-to-citation rewriting.
//!
//! The generator wraps [`htmd`] for the structural conversion and layers the
//! citation model on top: inline links become `[text]⟨n⟩` markers with a
//! references block enumerating every unique href in first-occurrence order.
//! When a content filter is supplied the same steps run again over the
//! filtered HTML to produce the `fit_*` pair.

mod citations;

pub use citations::{CITATION_CLOSE, CITATION_OPEN, rewrite_links_to_citations};

use anyhow::{Context, Result};
use htmd::element_handler::Handlers;
use htmd::{Element, HtmlToMarkdown};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::filters::ContentFilter;
use crate::models::MarkdownGenerationResult;

/// Conversion options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarkdownOptions {
    /// Soft-wrap body text at this column; `None` leaves lines unwrapped.
    pub body_width: Option<usize>,
    /// Escape markdown-significant characters in text content.
    pub escape: bool,
    /// Keep `<del>`, `<ins>`, `<sub>` and `<abbr>` semantics inline instead
    /// of flattening them to plain text.
    pub preserve_inline_semantics: bool,
    /// Insert the references block heading above the enumerated links.
    pub references_heading: String,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            body_width: None,
            escape: true,
            preserve_inline_semantics: true,
            references_heading: "## References".to_string(),
        }
    }
}

/// HTML → [`MarkdownGenerationResult`] generator.
#[derive(Debug, Clone, Default)]
pub struct MarkdownGenerator {
    options: MarkdownOptions,
}

impl MarkdownGenerator {
    #[must_use]
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }

    /// Generate all markdown variants for `html`.
    ///
    /// `base_url` anchors relative hrefs; `filter` (when present) produces
    /// the `fit_markdown` / `fit_html` pair. Output is deterministic:
    /// generating twice from the same inputs yields identical results,
    /// including citation numbering.
    pub fn generate(
        &self,
        html: &str,
        base_url: Option<&Url>,
        filter: Option<&ContentFilter>,
    ) -> Result<MarkdownGenerationResult> {
        let raw_markdown = self.convert(html)?;
        let (markdown_with_citations, references_markdown) = rewrite_links_to_citations(
            &raw_markdown,
            base_url,
            &self.options.references_heading,
        );

        let (fit_markdown, fit_html) = match filter {
            Some(filter) => {
                let fit_html = filter.filter(html)?;
                let fit_raw = self.convert(&fit_html)?;
                let (fit_cited, _) = rewrite_links_to_citations(
                    &fit_raw,
                    base_url,
                    &self.options.references_heading,
                );
                (fit_cited, fit_html)
            }
            None => (String::new(), String::new()),
        };

        Ok(MarkdownGenerationResult {
            raw_markdown,
            markdown_with_citations,
            references_markdown,
            fit_markdown,
            fit_html,
        })
    }

    /// Plain structural conversion with the configured options applied.
    fn convert(&self, html: &str) -> Result<String> {
        let mut builder = HtmlToMarkdown::builder().skip_tags(vec!["script", "style", "head"]);

        if self.options.preserve_inline_semantics {
            builder = builder
                .add_handler(
                    vec!["del", "s", "strike"],
                    |handlers: &dyn Handlers, el: Element| {
                        let content = handlers.walk_children(el.node).content;
                        Some(format!("~~{content}~~").into())
                    },
                )
                .add_handler(vec!["ins"], |handlers: &dyn Handlers, el: Element| {
                    let content = handlers.walk_children(el.node).content;
                    Some(format!("++{content}++").into())
                })
                .add_handler(vec!["sub"], |handlers: &dyn Handlers, el: Element| {
                    let content = handlers.walk_children(el.node).content;
                    Some(format!("~{content}~").into())
                })
                .add_handler(vec!["abbr"], |handlers: &dyn Handlers, el: Element| {
                    let content = handlers.walk_children(el.node).content;
                    let title = el
                        .attrs
                        .iter()
                        .find(|a| a.name.local.as_ref() == "title")
                        .map(|a| a.value.to_string());
                    match title {
                        Some(t) if !t.is_empty() => Some(format!("{content} ({t})").into()),
                        _ => Some(content.into()),
                    }
                });
        }

        let converter = builder.build();
        let mut markdown = converter
            .convert(html)
            .context("html to markdown conversion failed")?;

        if !self.options.escape {
            markdown = unescape_markdown(&markdown);
        }
        if let Some(width) = self.options.body_width {
            markdown = soft_wrap(&markdown, width);
        }
        Ok(markdown.trim().to_string())
    }
}

/// Undo backslash escapes htmd inserts for markdown-significant characters.
fn unescape_markdown(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut chars = markdown.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(next) = chars.peek()
            && matches!(*next, '[' | ']' | '*' | '_' | '#' | '`' | '~' | '>')
        {
            continue;
        }
        out.push(c);
    }
    out
}

/// Wrap prose lines at `width` columns. Headings, code fences, tables and
/// list markers are left alone so structure survives.
fn soft_wrap(markdown: &str, width: usize) -> String {
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            out.push(line.to_string());
            continue;
        }
        let structural = in_fence
            || trimmed.starts_with('#')
            || trimmed.starts_with('|')
            || trimmed.starts_with('>')
            || trimmed.starts_with("- ")
            || trimmed.starts_with("* ")
            || line.len() <= width;
        if structural {
            out.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > width {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out.join("\n")
}
