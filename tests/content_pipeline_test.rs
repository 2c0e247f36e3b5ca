//! Scraping, filtering and extraction through the public entry points,
//! driven by `file://` and `raw:` fixtures.

use crawlmark::{
    AsyncWebCrawler, BrowserConfig, Bm25Filter, ChunkingStrategy, ContentFilter,
    CrawlerRunConfig, ExtractionStrategy, JsonCssSchema, PruningFilter, SchemaField,
};

async fn crawler(dir: &tempfile::TempDir) -> AsyncWebCrawler {
    AsyncWebCrawler::with_base_dir(BrowserConfig::default(), dir.path())
        .await
        .expect("crawler")
}

#[tokio::test]
async fn local_file_crawl_extracts_metadata_and_filters_images() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let page = dir.path().join("page.html");
    tokio::fs::write(
        &page,
        r#"<html><head><title>T</title></head><body>
            <p>A paragraph with enough words to survive cleaning.</p>
            <img src="small.png" width="10" height="10" alt="tiny">
            <img src="large.png" width="300" height="300" alt="big picture">
        </body></html>"#,
    )
    .await
    .expect("write fixture");

    let result = crawler
        .arun(&format!("file://{}", page.display()), None)
        .await;
    assert!(result.success, "error: {:?}", result.error_message);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.metadata.get("title").map(String::as_str), Some("T"));
    assert_eq!(result.media.images.len(), 1, "only the 300x300 image survives");
    assert!(result.media.images[0].url.ends_with("large.png"));
}

#[tokio::test]
async fn excluded_tags_and_selectors_shape_cleaned_html() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .excluded_tags(["aside"])
        .excluded_selectors(["div.promo"])
        .build()
        .expect("config");
    let result = crawler
        .arun(
            "raw:<html><body>\
             <p>keep this paragraph of real content</p>\
             <aside>navigation noise</aside>\
             <div class=\"promo\">buy now</div>\
             </body></html>",
            Some(config),
        )
        .await;
    assert!(result.success);
    assert!(result.cleaned_html.contains("keep this paragraph"));
    assert!(!result.cleaned_html.contains("navigation noise"));
    assert!(!result.cleaned_html.contains("buy now"));
}

#[tokio::test]
async fn bm25_filter_populates_fit_markdown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .content_filter(ContentFilter::Bm25(Bm25Filter::new(
            Some("rust crawling".to_string()),
            0.2,
        )))
        .build()
        .expect("config");
    let result = crawler
        .arun(
            "raw:<html><body>\
             <p>Crawling the web with rust is the topic of this page and it \
             discusses rust crawling at length with many details.</p>\
             <p>Unrelated discount furniture sale this weekend only.</p>\
             </body></html>",
            Some(config),
        )
        .await;
    assert!(result.success, "error: {:?}", result.error_message);
    let md = result.markdown_v2.expect("markdown_v2");
    assert!(!md.fit_markdown.is_empty(), "filter must produce fit output");
    assert!(md.fit_markdown.to_lowercase().contains("rust"));
    assert!(!md.fit_markdown.contains("furniture"));
    assert!(!md.fit_html.is_empty());
}

#[tokio::test]
async fn pruning_filter_drops_boilerplate_regions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .content_filter(ContentFilter::Pruning(PruningFilter::default()))
        .build()
        .expect("config");
    let result = crawler
        .arun(
            "raw:<html><body>\
             <div class=\"content\"><p>The substantial article body with many \
             meaningful words that carry the page's actual information and \
             clearly dominate its text mass by a wide margin.</p></div>\
             <div class=\"sidebar ad\">subscribe</div>\
             </body></html>",
            Some(config),
        )
        .await;
    assert!(result.success);
    let md = result.markdown_v2.expect("markdown_v2");
    assert!(md.fit_markdown.contains("substantial article body"));
    assert!(!md.fit_markdown.contains("subscribe"));
}

#[tokio::test]
async fn css_schema_extraction_returns_structured_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let schema = JsonCssSchema {
        name: "products".into(),
        base_selector: "li.product".into(),
        fields: vec![
            SchemaField {
                name: "name".into(),
                selector: "span.name".into(),
                attribute: None,
            },
            SchemaField {
                name: "price".into(),
                selector: "span.price".into(),
                attribute: None,
            },
        ],
    };
    let config = CrawlerRunConfig::builder()
        .extraction_strategy(ExtractionStrategy::JsonCss(schema))
        .build()
        .expect("config");
    let result = crawler
        .arun(
            "raw:<html><body><ul>\
             <li class=\"product\"><span class=\"name\">Widget</span>\
             <span class=\"price\">9.99</span> a fine widget indeed</li>\
             <li class=\"product\"><span class=\"name\">Gadget</span>\
             <span class=\"price\">19.99</span> an even finer gadget</li>\
             </ul></body></html>",
            Some(config),
        )
        .await;
    assert!(result.success, "error: {:?}", result.error_message);

    let extracted = result.extracted_content.expect("extracted json");
    let records: Vec<serde_json::Value> = serde_json::from_str(&extracted).expect("json");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Widget");
    assert_eq!(records[1]["price"], "19.99");
}

#[tokio::test]
async fn chunked_extraction_emits_chunk_arrays() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .extraction_strategy(ExtractionStrategy::Chunked(ChunkingStrategy::Sentence))
        .build()
        .expect("config");
    let result = crawler
        .arun(
            "raw:<html><body><p>First sentence here. Second sentence there. \
             Third sentence everywhere.</p></body></html>",
            Some(config),
        )
        .await;
    assert!(result.success);
    let value: serde_json::Value =
        serde_json::from_str(&result.extracted_content.expect("json")).expect("parse");
    let chunks = value["chunks"].as_array().expect("chunks");
    assert_eq!(chunks.len(), 3);
}

#[tokio::test]
async fn social_media_links_are_excluded_when_configured() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .exclude_social_media_links(true)
        .build()
        .expect("config");
    let result = crawler
        .arun(
            "raw:<html><body>\
             <a href=\"https://twitter.com/someone\">tweet</a>\
             <a href=\"https://example.org/article\">article</a>\
             </body></html>",
            Some(config),
        )
        .await;
    assert!(result.success);
    assert_eq!(result.links.external.len(), 1);
    assert_eq!(result.links.external[0].url, "https://example.org/article");
}
