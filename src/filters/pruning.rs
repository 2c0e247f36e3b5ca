//! Density-based pruning filter.
//!
//! Each element is scored by a composite of text mass, link-text ratio, tag
//! depth, class/id hints and its share of text among siblings. Subtrees
//! scoring below the threshold are detached. Comments, scripts, styles and
//! empty blocks are removed up front.

use anyhow::{Context, Result};
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use serde::{Deserialize, Serialize};

/// Fixed or distribution-derived pruning threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PruningThreshold {
    /// Prune everything scoring below this value.
    Fixed(f64),
    /// Derive the cutoff from the score distribution (mean − 0.5·stddev).
    Dynamic,
}

impl Default for PruningThreshold {
    fn default() -> Self {
        Self::Dynamic
    }
}

/// Class/id fragments that mark boilerplate.
const NEGATIVE_HINTS: &[&str] = &[
    "nav", "menu", "sidebar", "footer", "header", "banner", "ad", "ads", "advert", "promo",
    "social", "share", "comment", "cookie", "popup", "modal", "related", "breadcrumb",
];

/// Class/id fragments that mark main content.
const POSITIVE_HINTS: &[&str] = &[
    "content", "article", "main", "body", "post", "text", "entry", "story",
];

/// Tags whose subtrees never carry content.
const NOISE_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Density-pruning content filter.
#[derive(Debug, Clone, Default)]
pub struct PruningFilter {
    threshold: PruningThreshold,
    /// Words below which a leaf block counts as empty.
    min_word_threshold: usize,
}

impl PruningFilter {
    #[must_use]
    pub fn new(threshold: PruningThreshold, min_word_threshold: usize) -> Self {
        Self {
            threshold,
            min_word_threshold,
        }
    }

    /// Prune low-signal subtrees out of `html` and return what remains.
    pub fn filter(&self, html: &str) -> Result<String> {
        let document = kuchiki::parse_html().one(html.to_string());

        remove_noise(&document);

        let body = document
            .select_first("body")
            .ok()
            .map_or_else(|| document.clone(), |b| b.as_node().clone());

        // Score candidate subtrees, then detach the losers. Collect first:
        // detaching while walking invalidates the traversal.
        let mut scored: Vec<(NodeRef, f64)> = Vec::new();
        collect_scores(&body, 0, &mut scored);

        if scored.is_empty() {
            return serialize(&body);
        }

        let cutoff = match self.threshold {
            PruningThreshold::Fixed(value) => value,
            PruningThreshold::Dynamic => {
                let scores: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                let variance = scores
                    .iter()
                    .map(|s| (s - mean).powi(2))
                    .sum::<f64>()
                    / scores.len() as f64;
                mean - 0.5 * variance.sqrt()
            }
        };

        for (node, score) in &scored {
            if *score < cutoff {
                node.detach();
            }
        }

        // A second pass clears blocks the pruning emptied out.
        remove_empty_blocks(&body, self.min_word_threshold);

        serialize(&body)
    }
}

/// Drop comments, scripts, styles and kin everywhere under `root`.
fn remove_noise(root: &NodeRef) {
    let mut doomed = Vec::new();
    for node in root.descendants() {
        match node.data() {
            NodeData::Comment(_) => doomed.push(node.clone()),
            NodeData::Element(data) => {
                if NOISE_TAGS.contains(&data.name.local.as_ref()) {
                    doomed.push(node.clone());
                }
            }
            _ => {}
        }
    }
    for node in doomed {
        node.detach();
    }
}

/// Score each element child of `node` and recurse. Only container-level
/// elements are candidates; inline elements ride along with their parent.
fn collect_scores(node: &NodeRef, depth: usize, out: &mut Vec<(NodeRef, f64)>) {
    for child in node.children() {
        let Some(data) = child.as_element() else {
            continue;
        };
        let tag = data.name.local.as_ref();
        if matches!(
            tag,
            "div" | "section" | "article" | "aside" | "nav" | "ul" | "ol" | "table" | "footer"
                | "header" | "form"
        ) {
            let score = composite_score(&child, data, depth, node);
            out.push((child.clone(), score));
        }
        collect_scores(&child, depth + 1, out);
    }
}

/// The composite: text mass (log-scaled), 1 − link density, depth decay,
/// class/id hints, sibling text share.
fn composite_score(
    node: &NodeRef,
    data: &kuchiki::ElementData,
    depth: usize,
    parent: &NodeRef,
) -> f64 {
    let text = node.text_contents();
    let text_len = text.split_whitespace().count() as f64;
    let link_len = link_text_len(node) as f64;

    let text_score = (1.0 + text_len).ln();
    let link_density = if text_len > 0.0 {
        (link_len / text_len).min(1.0)
    } else {
        1.0
    };
    let depth_decay = 1.0 / (1.0 + depth as f64 * 0.1);

    let attrs = data.attributes.borrow();
    let hints = format!(
        "{} {}",
        attrs.get("class").unwrap_or_default(),
        attrs.get("id").unwrap_or_default()
    )
    .to_lowercase();
    let mut hint_score = 0.0;
    if POSITIVE_HINTS.iter().any(|h| hints.contains(h)) {
        hint_score += 1.0;
    }
    if NEGATIVE_HINTS.iter().any(|h| hints.contains(h)) {
        hint_score -= 1.5;
    }

    let parent_text = parent.text_contents().split_whitespace().count() as f64;
    let sibling_share = if parent_text > 0.0 {
        text_len / parent_text
    } else {
        0.0
    };

    text_score * (1.0 - link_density) * depth_decay + hint_score + sibling_share
}

fn link_text_len(node: &NodeRef) -> usize {
    let mut total = 0;
    for descendant in node.descendants() {
        if let Some(data) = descendant.as_element()
            && data.name.local.as_ref() == "a"
        {
            total += descendant.text_contents().split_whitespace().count();
        }
    }
    total
}

/// Detach block elements whose surviving text is below the word floor and
/// which contain no media.
fn remove_empty_blocks(root: &NodeRef, min_words: usize) {
    let mut doomed = Vec::new();
    for node in root.descendants() {
        let Some(data) = node.as_element() else {
            continue;
        };
        let tag = data.name.local.as_ref();
        if !matches!(tag, "div" | "section" | "p" | "span" | "aside" | "ul" | "ol") {
            continue;
        }
        let words = node.text_contents().split_whitespace().count();
        let has_media = node.descendants().any(|d| {
            d.as_element()
                .is_some_and(|e| matches!(e.name.local.as_ref(), "img" | "video" | "audio"))
        });
        if words < min_words && !has_media {
            doomed.push(node.clone());
        }
    }
    for node in doomed {
        // A parent detach may have already removed this node; detach is
        // idempotent on orphans.
        node.detach();
    }
}

fn serialize(node: &NodeRef) -> Result<String> {
    let mut out = Vec::new();
    node.serialize(&mut out)
        .context("failed to serialize pruned html")?;
    String::from_utf8(out).context("pruned html is not valid utf-8")
}
