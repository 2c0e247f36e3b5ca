//! Page-level metadata extraction.

use std::collections::HashMap;

use kuchiki::NodeRef;

/// Pull title, description, keywords, canonical URL, Open Graph and Twitter
/// Card fields, language and charset out of the document head.
///
/// Keys are flat: `title`, `description`, `keywords`, `canonical`,
/// `language`, `charset`, `og:*`, `twitter:*`.
pub fn extract_metadata(document: &NodeRef) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    if let Ok(title) = document.select_first("title") {
        let text = title.text_contents().trim().to_string();
        if !text.is_empty() {
            metadata.insert("title".to_string(), text);
        }
    }

    if let Ok(html) = document.select_first("html") {
        let attrs = html.attributes.borrow();
        if let Some(lang) = attrs.get("lang").filter(|l| !l.is_empty()) {
            metadata.insert("language".to_string(), lang.to_string());
        }
    }

    if let Ok(canonical) = document.select_first("link[rel=canonical]") {
        let attrs = canonical.attributes.borrow();
        if let Some(href) = attrs.get("href").filter(|h| !h.is_empty()) {
            metadata.insert("canonical".to_string(), href.to_string());
        }
    }

    if let Ok(metas) = document.select("meta") {
        for meta in metas {
            let attrs = meta.attributes.borrow();
            if let Some(charset) = attrs.get("charset") {
                metadata.insert("charset".to_string(), charset.to_lowercase());
                continue;
            }
            let Some(content) = attrs.get("content") else {
                continue;
            };
            // Standard metas use name=, Open Graph uses property=.
            let key = attrs.get("name").or_else(|| attrs.get("property"));
            let Some(key) = key else {
                continue;
            };
            let keep = matches!(key, "description" | "keywords" | "author")
                || key.starts_with("og:")
                || key.starts_with("twitter:");
            if keep && !content.is_empty() {
                metadata.insert(key.to_string(), content.to_string());
            }
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    #[test]
    fn extracts_the_standard_fields() {
        let html = r#"<html lang="en"><head>
            <meta charset="UTF-8">
            <title> The Title </title>
            <meta name="description" content="A page about things">
            <meta name="keywords" content="a,b,c">
            <link rel="canonical" href="https://example.com/canonical">
            <meta property="og:title" content="OG Title">
            <meta name="twitter:card" content="summary">
        </head><body></body></html>"#;
        let doc = kuchiki::parse_html().one(html.to_string());
        let metadata = extract_metadata(&doc);

        assert_eq!(metadata.get("title").map(String::as_str), Some("The Title"));
        assert_eq!(metadata.get("language").map(String::as_str), Some("en"));
        assert_eq!(metadata.get("charset").map(String::as_str), Some("utf-8"));
        assert_eq!(
            metadata.get("description").map(String::as_str),
            Some("A page about things")
        );
        assert_eq!(
            metadata.get("canonical").map(String::as_str),
            Some("https://example.com/canonical")
        );
        assert_eq!(metadata.get("og:title").map(String::as_str), Some("OG Title"));
        assert_eq!(
            metadata.get("twitter:card").map(String::as_str),
            Some("summary")
        );
    }

    #[test]
    fn missing_fields_are_simply_absent() {
        let doc = kuchiki::parse_html().one("<html><body><p>x</p></body></html>".to_string());
        let metadata = extract_metadata(&doc);
        assert!(metadata.get("title").is_none());
        assert!(metadata.get("description").is_none());
    }

    #[test]
    fn unrecognized_meta_names_are_ignored() {
        let html = r#"<head><meta name="viewport" content="width=device-width"></head>"#;
        let doc = kuchiki::parse_html().one(html.to_string());
        let metadata = extract_metadata(&doc);
        assert!(metadata.get("viewport").is_none());
    }
}
