//! Link extraction, normalization and classification.

use std::collections::HashSet;

use kuchiki::NodeRef;
use url::Url;

use crate::config::CrawlerRunConfig;
use crate::models::{Link, Links};
use crate::url_ref::fast_join;
use crate::utils::same_host;

/// Domains excluded when social-media filtering is on; subdomains match too.
pub const SOCIAL_MEDIA_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "instagram.com",
    "pinterest.com",
    "tiktok.com",
    "snapchat.com",
    "reddit.com",
];

/// Walk the scoped tree and build the deduplicated link inventory.
pub fn extract_links(
    root: &NodeRef,
    base_url: Option<&Url>,
    config: &CrawlerRunConfig,
) -> Links {
    let mut links = Links::default();
    let mut seen: HashSet<String> = HashSet::new();

    for node in root.descendants() {
        let Some(element) = node.as_element() else {
            continue;
        };
        if element.name.local.as_ref() != "a" {
            continue;
        }
        let attrs = element.attributes.borrow();
        let Some(href) = attrs.get("href") else {
            continue;
        };
        let Some(normalized) = normalize_href(href, base_url) else {
            continue;
        };
        if !seen.insert(normalized.clone()) {
            continue;
        }

        let text = node
            .text_contents()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let title = attrs.get("title").map(str::to_string).filter(|t| !t.is_empty());
        let link = Link {
            url: normalized.clone(),
            text,
            title,
        };

        match classify(&normalized, base_url) {
            LinkClass::Internal => links.internal.push(link),
            LinkClass::External => {
                if keep_external(&normalized, config) {
                    links.external.push(link);
                }
            }
        }
    }
    links
}

enum LinkClass {
    Internal,
    External,
}

/// Resolve and normalize one href. Anchors and script pseudo-links vanish;
/// mailto:/tel: pass through untouched.
fn normalize_href(href: &str, base_url: Option<&Url>) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    if trimmed.starts_with("javascript:") || trimmed.starts_with("data:") {
        return None;
    }
    if trimmed.starts_with("mailto:") || trimmed.starts_with("tel:") {
        return Some(trimmed.to_string());
    }
    match base_url {
        Some(base) => fast_join(base, trimmed),
        None => Some(trimmed.to_string()),
    }
}

fn classify(url: &str, base_url: Option<&Url>) -> LinkClass {
    if url.starts_with("mailto:") || url.starts_with("tel:") {
        return LinkClass::External;
    }
    match (Url::parse(url), base_url) {
        (Ok(parsed), Some(base)) if same_host(&parsed, base) => LinkClass::Internal,
        (Ok(_), Some(_)) => LinkClass::External,
        // Without a base everything non-relative is external.
        _ => LinkClass::External,
    }
}

fn keep_external(url: &str, config: &CrawlerRunConfig) -> bool {
    if config.exclude_external_links {
        return false;
    }
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        // mailto:/tel: have no host; domain filters cannot apply.
        return true;
    };
    let host = host.trim_start_matches("www.");

    if (config.exclude_social_media_links || config.exclude_social_media_domains)
        && SOCIAL_MEDIA_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    {
        return false;
    }
    if config
        .exclude_domains
        .iter()
        .any(|d| host == d.as_str() || host.ends_with(&format!(".{d}")))
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn extract(html: &str, config: &CrawlerRunConfig) -> Links {
        let doc = kuchiki::parse_html().one(html.to_string());
        let base = Url::parse("https://example.com/docs/").expect("test url");
        extract_links(&doc, Some(&base), config)
    }

    #[test]
    fn splits_internal_and_external_by_host() {
        let links = extract(
            r#"<body>
                <a href="/page">in</a>
                <a href="relative">rel</a>
                <a href="https://other.test/x">out</a>
            </body>"#,
            &CrawlerRunConfig::default(),
        );
        assert_eq!(links.internal.len(), 2);
        assert_eq!(links.external.len(), 1);
        assert_eq!(links.internal[0].url, "https://example.com/page");
        assert_eq!(links.internal[1].url, "https://example.com/docs/relative");
    }

    #[test]
    fn deduplicates_by_resolved_url() {
        let links = extract(
            r#"<body><a href="/p">one</a><a href="/p">two</a></body>"#,
            &CrawlerRunConfig::default(),
        );
        assert_eq!(links.internal.len(), 1);
        assert_eq!(links.internal[0].text, "one");
    }

    #[test]
    fn anchors_and_script_links_are_dropped() {
        let links = extract(
            r##"<body><a href="#top">t</a><a href="javascript:void(0)">j</a></body>"##,
            &CrawlerRunConfig::default(),
        );
        assert!(links.internal.is_empty());
        assert!(links.external.is_empty());
    }

    #[test]
    fn mailto_and_tel_pass_through_as_external() {
        let links = extract(
            r#"<body><a href="mailto:a@b.c">mail</a><a href="tel:+1555">call</a></body>"#,
            &CrawlerRunConfig::default(),
        );
        assert_eq!(links.external.len(), 2);
        assert_eq!(links.external[0].url, "mailto:a@b.c");
    }

    #[test]
    fn social_media_exclusion_covers_subdomains() {
        let config = CrawlerRunConfig::builder()
            .exclude_social_media_links(true)
            .build()
            .expect("config");
        let links = extract(
            r#"<body>
                <a href="https://www.facebook.com/page">f</a>
                <a href="https://mobile.twitter.com/u">t</a>
                <a href="https://allowed.test/x">ok</a>
            </body>"#,
            &config,
        );
        assert_eq!(links.external.len(), 1);
        assert_eq!(links.external[0].url, "https://allowed.test/x");
    }

    #[test]
    fn domain_exclusion_list_applies() {
        let config = CrawlerRunConfig::builder()
            .exclude_domains(["blocked.test"])
            .build()
            .expect("config");
        let links = extract(
            r#"<body><a href="https://blocked.test/x">b</a><a href="https://fine.test/y">f</a></body>"#,
            &config,
        );
        assert_eq!(links.external.len(), 1);
        assert_eq!(links.external[0].url, "https://fine.test/y");
    }

    #[test]
    fn external_links_can_be_excluded_wholesale() {
        let config = CrawlerRunConfig::builder()
            .exclude_external_links(true)
            .build()
            .expect("config");
        let links = extract(
            r#"<body><a href="/in">i</a><a href="https://other.test/o">o</a></body>"#,
            &config,
        );
        assert_eq!(links.internal.len(), 1);
        assert!(links.external.is_empty());
    }

    #[test]
    fn titles_are_captured() {
        let links = extract(
            r#"<body><a href="/p" title="The Page">p</a></body>"#,
            &CrawlerRunConfig::default(),
        );
        assert_eq!(links.internal[0].title.as_deref(), Some("The Page"));
    }
}
