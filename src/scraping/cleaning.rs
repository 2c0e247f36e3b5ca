//! DOM cleaning: noise removal, attribute stripping, wrapper collapsing.

use kuchiki::{NodeData, NodeRef};

use crate::config::CrawlerRunConfig;
use crate::error::CrawlError;

/// Tags removed unconditionally; the page's behavior layer, not content.
const NOISE_TAGS: &[&str] = &["script", "style", "noscript", "template", "link", "meta"];

/// Block-level tags subject to the empty-block rule.
const BLOCK_TAGS: &[&str] = &[
    "div", "section", "article", "aside", "p", "span", "ul", "ol", "table", "figure",
];

/// Attributes that never survive cleaning.
const STRIPPED_ATTRIBUTES: &[&str] = &["style", "onclick", "onload", "onerror", "onmouseover"];

/// Mutate `root` in place per the run config.
///
/// Order matters: structural removals first (noise, excluded tags and
/// selectors, forms), then attribute stripping, then the empty-block sweep
/// which judges what the removals left behind.
pub fn clean_tree(root: &NodeRef, config: &CrawlerRunConfig) -> Result<(), CrawlError> {
    remove_comments(root);
    remove_tags(root, NOISE_TAGS);

    let excluded: Vec<&str> = config.excluded_tags.iter().map(String::as_str).collect();
    if !excluded.is_empty() {
        remove_tags(root, &excluded);
    }
    if config.remove_forms {
        remove_tags(root, &["form", "input", "select", "textarea", "button"]);
    }
    for selector in &config.excluded_selectors {
        remove_selector(root, selector)?;
    }

    strip_attributes(root, config.keep_data_attributes);
    remove_empty_blocks(root, config.word_count_threshold);
    Ok(())
}

fn remove_comments(root: &NodeRef) {
    let doomed: Vec<NodeRef> = root
        .descendants()
        .filter(|n| matches!(n.data(), NodeData::Comment(_)))
        .collect();
    for node in doomed {
        node.detach();
    }
}

fn remove_tags(root: &NodeRef, tags: &[&str]) {
    let doomed: Vec<NodeRef> = root
        .descendants()
        .filter(|n| {
            n.as_element()
                .is_some_and(|e| tags.contains(&e.name.local.as_ref()))
        })
        .collect();
    for node in doomed {
        node.detach();
    }
}

fn remove_selector(root: &NodeRef, selector: &str) -> Result<(), CrawlError> {
    let matches: Vec<NodeRef> = root
        .select(selector)
        .map_err(|()| CrawlError::Config(format!("invalid excluded selector '{selector}'")))?
        .map(|m| m.as_node().clone())
        .collect();
    for node in matches {
        node.detach();
    }
    Ok(())
}

/// Drop inline event handlers and styles everywhere; drop `data-*` unless
/// the caller asked to keep them.
fn strip_attributes(root: &NodeRef, keep_data_attributes: bool) {
    for node in root.descendants() {
        let Some(element) = node.as_element() else {
            continue;
        };
        let mut attrs = element.attributes.borrow_mut();
        let doomed: Vec<String> = attrs
            .map
            .keys()
            .map(|k| k.local.to_string())
            .filter(|name| {
                STRIPPED_ATTRIBUTES.contains(&name.as_str())
                    || (!keep_data_attributes && name.starts_with("data-"))
            })
            .collect();
        for name in doomed {
            attrs.remove(name.as_str());
        }
    }
}

/// Remove block elements whose text falls under the word threshold and that
/// contain no media or links worth keeping.
fn remove_empty_blocks(root: &NodeRef, word_threshold: usize) {
    let doomed: Vec<NodeRef> = root
        .descendants()
        .filter(|node| {
            let Some(element) = node.as_element() else {
                return false;
            };
            if !BLOCK_TAGS.contains(&element.name.local.as_ref()) {
                return false;
            }
            let words = node.text_contents().split_whitespace().count();
            if words >= word_threshold.max(1) {
                return false;
            }
            !node.descendants().any(|d| {
                d.as_element().is_some_and(|e| {
                    matches!(e.name.local.as_ref(), "img" | "video" | "audio" | "a" | "iframe")
                })
            })
        })
        .collect();
    for node in doomed {
        node.detach();
    }
}

/// Collapse `<div><div>…</div></div>` style nesting: a block whose only
/// element child has the same tag and no attributes of its own contributes
/// no structure, so the child's children move up.
pub fn collapse_redundant_wrappers(root: &NodeRef) {
    loop {
        let mut collapsed = false;
        let candidates: Vec<NodeRef> = root.descendants().collect();
        for node in candidates {
            let Some(element) = node.as_element() else {
                continue;
            };
            let children: Vec<NodeRef> = node
                .children()
                .filter(|c| {
                    !matches!(c.data(), NodeData::Text(t) if t.borrow().trim().is_empty())
                })
                .collect();
            if children.len() != 1 {
                continue;
            }
            let only = &children[0];
            let Some(child_element) = only.as_element() else {
                continue;
            };
            if child_element.name.local != element.name.local {
                continue;
            }
            if !child_element.attributes.borrow().map.is_empty() {
                continue;
            }
            let grandchildren: Vec<NodeRef> = only.children().collect();
            for grandchild in grandchildren {
                grandchild.detach();
                node.append(grandchild);
            }
            only.detach();
            collapsed = true;
        }
        if !collapsed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::serialize;
    use kuchiki::traits::TendrilSink;

    fn parse(html: &str) -> NodeRef {
        kuchiki::parse_html().one(html.to_string())
    }

    #[test]
    fn removes_noise_comments_and_event_handlers() {
        let doc = parse(
            "<body><!-- gone --><script>x()</script>\
             <p onclick=\"hack()\" style=\"color:red\">kept text here</p></body>",
        );
        clean_tree(&doc, &CrawlerRunConfig::default()).expect("clean");
        let html = serialize(&doc).expect("serialize");
        assert!(!html.contains("gone"));
        assert!(!html.contains("script"));
        assert!(!html.contains("onclick"));
        assert!(!html.contains("style="));
        assert!(html.contains("kept text here"));
    }

    #[test]
    fn strips_data_attributes_unless_kept() {
        let html = "<body><p data-track=\"1\" id=\"p1\">some words here</p></body>";
        let doc = parse(html);
        clean_tree(&doc, &CrawlerRunConfig::default()).expect("clean");
        let out = serialize(&doc).expect("serialize");
        assert!(!out.contains("data-track"));
        assert!(out.contains("id=\"p1\""));

        let doc = parse(html);
        let config = CrawlerRunConfig::builder()
            .keep_data_attributes(true)
            .build()
            .expect("config");
        clean_tree(&doc, &config).expect("clean");
        assert!(serialize(&doc).expect("serialize").contains("data-track"));
    }

    #[test]
    fn removes_forms_when_asked() {
        let doc = parse("<body><form><input></form><p>content words stay</p></body>");
        let config = CrawlerRunConfig::builder().remove_forms(true).build().expect("config");
        clean_tree(&doc, &config).expect("clean");
        let out = serialize(&doc).expect("serialize");
        assert!(!out.contains("<form"));
        assert!(!out.contains("<input"));
        assert!(out.contains("content words stay"));
    }

    #[test]
    fn excluded_selectors_are_detached_and_bad_ones_error() {
        let doc = parse("<body><div class=\"ads\">x</div><p>real words stay</p></body>");
        let config = CrawlerRunConfig::builder()
            .excluded_selectors(["div.ads"])
            .build()
            .expect("config");
        clean_tree(&doc, &config).expect("clean");
        assert!(!serialize(&doc).expect("serialize").contains("ads"));

        let bad = CrawlerRunConfig::builder()
            .excluded_selectors([":::"])
            .build()
            .expect("config");
        assert!(clean_tree(&parse("<body></body>"), &bad).is_err());
    }

    #[test]
    fn collapses_same_tag_wrappers() {
        let doc = parse("<body><div id=\"outer\"><div><p>deep text content</p></div></div></body>");
        collapse_redundant_wrappers(&doc);
        let out = serialize(&doc).expect("serialize");
        let div_count = out.matches("<div").count();
        assert_eq!(div_count, 1, "nested bare div should collapse: {out}");
        assert!(out.contains("deep text content"));
    }

    #[test]
    fn empty_blocks_below_threshold_are_dropped() {
        let doc = parse("<body><div>tiny</div><p>this paragraph has plenty of words</p></body>");
        let config = CrawlerRunConfig::builder()
            .word_count_threshold(3)
            .build()
            .expect("config");
        clean_tree(&doc, &config).expect("clean");
        let out = serialize(&doc).expect("serialize");
        assert!(!out.contains("tiny"));
        assert!(out.contains("plenty of words"));
    }
}
