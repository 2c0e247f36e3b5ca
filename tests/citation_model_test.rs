//! End-to-end checks of the markdown citation model through the public
//! crawl entry point, using `raw:` fixtures so no browser is involved.

use crawlmark::{AsyncWebCrawler, BrowserConfig};

async fn crawler(dir: &tempfile::TempDir) -> AsyncWebCrawler {
    AsyncWebCrawler::with_base_dir(BrowserConfig::default(), dir.path())
        .await
        .expect("crawler")
}

#[tokio::test]
async fn raw_html_round_trip_produces_expected_citation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let url = r#"raw:<html><body><p>Hello <a href="https://x.test/a">link</a></p></body></html>"#;
    let result = crawler.arun(url, None).await;
    assert!(result.success, "error: {:?}", result.error_message);

    let md = result.markdown_v2.expect("markdown_v2");
    let flattened = md
        .markdown_with_citations
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    assert!(
        flattened.contains("Hello [link]⟨1⟩"),
        "got: {flattened:?}"
    );
    assert!(md.references_markdown.contains("⟨1⟩ https://x.test/a"));
    assert!(result.media.images.is_empty());
}

#[tokio::test]
async fn citation_indices_are_dense_and_first_occurrence_ordered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let url = "raw:<html><body><p>\
        <a href=\"https://a.test/one\">first</a> \
        <a href=\"https://b.test/two\">second</a> \
        <a href=\"https://a.test/one\">repeat</a> \
        <a href=\"https://c.test/three\">third</a>\
        </p></body></html>";
    let result = crawler.arun(url, None).await;
    assert!(result.success);
    let md = result.markdown_v2.expect("markdown_v2");

    // Exactly {1..3}, assigned left to right.
    for n in 1..=3 {
        assert!(md.markdown_with_citations.contains(&format!("⟨{n}⟩")));
    }
    assert!(!md.markdown_with_citations.contains("⟨4⟩"));
    assert!(md.markdown_with_citations.contains("[repeat]⟨1⟩"));

    let a = md.references_markdown.find("https://a.test/one").expect("a");
    let b = md.references_markdown.find("https://b.test/two").expect("b");
    let c = md.references_markdown.find("https://c.test/three").expect("c");
    assert!(a < b && b < c, "references must keep first-occurrence order");
}

#[tokio::test]
async fn markdown_generation_is_idempotent_on_cited_output() {
    use crawlmark::{MarkdownGenerator, MarkdownOptions};
    use url::Url;

    let generator = MarkdownGenerator::new(MarkdownOptions::default());
    let base = Url::parse("https://x.test/").expect("url");
    let html = r#"<p><a href="/a">A</a> and <a href="/b">B</a> and <a href="/a">A again</a></p>"#;

    let first = generator.generate(html, Some(&base), None).expect("first");
    let second = generator.generate(html, Some(&base), None).expect("second");
    assert_eq!(
        first.markdown_with_citations, second.markdown_with_citations,
        "same input must number identically"
    );

    // Re-rewriting already-cited markdown must change nothing.
    let (again, refs) = crawlmark::markdown::rewrite_links_to_citations(
        &first.markdown_with_citations,
        Some(&base),
        "## References",
    );
    assert_eq!(again, first.markdown_with_citations);
    assert!(refs.is_empty());
}

#[tokio::test]
async fn pages_without_anchors_have_no_references_block() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let result = crawler
        .arun("raw:<html><body><p>plain prose only</p></body></html>", None)
        .await;
    assert!(result.success);
    let md = result.markdown_v2.expect("markdown_v2");
    assert!(md.references_markdown.is_empty());
    assert!(!md.markdown_with_citations.contains('⟨'));
}
