//! Link-to-citation rewriting.
//!
//! Inline links are replaced by numbered markers in left-to-right document
//! order: the first occurrence of each unique href claims the next index,
//! repeats reuse it. Image links (`![alt](src)`) keep their form. The pass
//! is idempotent — a marker like `[text]⟨1⟩` contains no `(...)` target, so
//! running the rewrite again changes nothing.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::url_ref::fast_join;

/// Citation marker delimiters.
pub const CITATION_OPEN: char = '⟨';
pub const CITATION_CLOSE: char = '⟩';

/// Inline markdown link: optional leading `!`, `[text](target)` where the
/// target may carry a quoted title. Text may contain balanced single-level
/// brackets (htmd escapes the rest).
static INLINE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(!?)\[([^\]]*)\]\(\s*(<[^>]*>|[^)\s]+)(?:\s+"([^"]*)")?\s*\)"#)
        .expect("inline link regex is statically valid")
});

/// Rewrite every inline link in `markdown` to a citation marker and return
/// `(markdown_with_citations, references_markdown)`.
///
/// Hrefs are resolved against `base_url` first so citations always point at
/// absolute URLs. `heading` tops the references block when non-empty.
#[must_use]
pub fn rewrite_links_to_citations(
    markdown: &str,
    base_url: Option<&Url>,
    heading: &str,
) -> (String, String) {
    // href -> (index, title) in first-occurrence order.
    let mut assigned: HashMap<String, usize> = HashMap::new();
    let mut references: Vec<(String, Option<String>)> = Vec::new();

    let rewritten = INLINE_LINK.replace_all(markdown, |caps: &regex::Captures| {
        let bang = &caps[1];
        let text = &caps[2];
        let target = caps[3].trim_matches(['<', '>']);
        let title = caps.get(4).map(|m| m.as_str().to_string());

        // Images keep their inline form; a citation cannot render pixels.
        if bang == "!" {
            return caps[0].to_string();
        }

        let resolved = resolve(target, base_url);
        let Some(href) = resolved else {
            // Fragment-only or unresolvable targets keep their text.
            return text.to_string();
        };

        let index = *assigned.entry(href.clone()).or_insert_with(|| {
            references.push((href.clone(), title.clone()));
            references.len()
        });
        format!("[{text}]{CITATION_OPEN}{index}{CITATION_CLOSE}")
    });

    let mut block = String::new();
    if !references.is_empty() {
        if !heading.is_empty() {
            block.push_str(heading);
            block.push_str("\n\n");
        }
        for (idx, (href, title)) in references.iter().enumerate() {
            let n = idx + 1;
            match title {
                Some(t) if !t.is_empty() => {
                    block.push_str(&format!(
                        "{CITATION_OPEN}{n}{CITATION_CLOSE} {href}: \"{t}\"\n"
                    ));
                }
                _ => {
                    block.push_str(&format!("{CITATION_OPEN}{n}{CITATION_CLOSE} {href}\n"));
                }
            }
        }
    }

    (rewritten.into_owned(), block)
}

fn resolve(target: &str, base_url: Option<&Url>) -> Option<String> {
    match base_url {
        Some(base) => fast_join(base, target),
        None if target.starts_with('#') || target.is_empty() => None,
        None => Some(target.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/docs/").expect("test url")
    }

    #[test]
    fn assigns_indices_in_first_occurrence_order() {
        let md = "[a](https://a.test) and [b](https://b.test) and [a again](https://a.test)";
        let (cited, refs) = rewrite_links_to_citations(md, Some(&base()), "## References");
        assert_eq!(cited, "[a]⟨1⟩ and [b]⟨2⟩ and [a again]⟨1⟩");
        assert!(refs.starts_with("## References"));
        assert!(refs.contains("⟨1⟩ https://a.test"));
        assert!(refs.contains("⟨2⟩ https://b.test"));
    }

    #[test]
    fn indices_are_exactly_one_to_n_unique_hrefs() {
        let md = "[x](/1) [y](/2) [z](/1) [w](/3)";
        let (cited, refs) = rewrite_links_to_citations(md, Some(&base()), "");
        for n in 1..=3 {
            assert!(cited.contains(&format!("⟨{n}⟩")));
            assert!(refs.contains(&format!("⟨{n}⟩ ")));
        }
        assert!(!cited.contains("⟨4⟩"));
    }

    #[test]
    fn titles_survive_into_references() {
        let md = r#"[doc](https://a.test/doc "The Title")"#;
        let (_, refs) = rewrite_links_to_citations(md, Some(&base()), "");
        assert!(refs.contains("⟨1⟩ https://a.test/doc: \"The Title\""));
    }

    #[test]
    fn relative_hrefs_resolve_against_base() {
        let md = "[guide](guide/intro) [root](/api)";
        let (_, refs) = rewrite_links_to_citations(md, Some(&base()), "");
        assert!(refs.contains("https://example.com/docs/guide/intro"));
        assert!(refs.contains("https://example.com/api"));
    }

    #[test]
    fn images_are_left_alone() {
        let md = "![logo](https://a.test/logo.png) [link](https://a.test)";
        let (cited, _) = rewrite_links_to_citations(md, Some(&base()), "");
        assert!(cited.contains("![logo](https://a.test/logo.png)"));
        assert!(cited.contains("[link]⟨1⟩"));
    }

    #[test]
    fn fragment_links_lose_their_brackets() {
        let md = "see [below](#section)";
        let (cited, refs) = rewrite_links_to_citations(md, Some(&base()), "");
        assert_eq!(cited, "see below");
        assert!(refs.is_empty());
    }

    #[test]
    fn rewrite_is_idempotent() {
        let md = "[a](https://a.test) and [b](https://b.test)";
        let (once, refs_once) = rewrite_links_to_citations(md, Some(&base()), "## References");
        let (twice, refs_twice) = rewrite_links_to_citations(&once, Some(&base()), "## References");
        assert_eq!(once, twice);
        assert!(refs_twice.is_empty());
        assert!(!refs_once.is_empty());
    }

    #[test]
    fn no_links_means_empty_references() {
        let (cited, refs) = rewrite_links_to_citations("plain text", Some(&base()), "## References");
        assert_eq!(cited, "plain text");
        assert!(refs.is_empty());
    }
}
