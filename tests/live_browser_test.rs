//! End-to-end tests that drive a real Chrome instance.
//!
//! Ignored by default: they need a local Chrome/Chromium binary (or
//! `CRAWLMARK_BROWSER_PATH`) and network access. Run with
//! `cargo test -- --ignored` on a machine that has both.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crawlmark::{
    AsyncWebCrawler, BrowserConfig, BrowserManager, CacheMode, CrawlerRunConfig, HookPoint,
};

async fn crawler(dir: &tempfile::TempDir) -> AsyncWebCrawler {
    AsyncWebCrawler::with_base_dir(BrowserConfig::default(), dir.path())
        .await
        .expect("crawler")
}

#[tokio::test]
#[ignore = "requires local Chrome and network"]
async fn happy_web_crawl_returns_markdown_with_citations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .cache_mode(CacheMode::Bypass)
        .build()
        .expect("config");
    let result = crawler.arun("https://example.com", Some(config)).await;

    assert!(result.success, "error: {:?}", result.error_message);
    assert_eq!(result.status_code, Some(200));
    assert!(!result.html.is_empty());
    let md = result.markdown_v2.expect("markdown_v2");
    // example.com carries one anchor; if any anchor exists the citation
    // marker shape must appear.
    if !result.links.external.is_empty() || !result.links.internal.is_empty() {
        assert!(
            md.markdown_with_citations.contains('⟨'),
            "anchors present but no citations: {}",
            md.markdown_with_citations
        );
        assert!(!md.references_markdown.is_empty());
    }
    crawler.close().await.expect("close");
}

#[tokio::test]
#[ignore = "requires local Chrome and network"]
async fn cache_hit_skips_the_browser_entirely() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let first = crawler.arun("https://example.com", None).await;
    assert!(first.success);
    let pages_after_first = crawler.browser_manager().pages_opened();
    assert!(pages_after_first >= 1);

    let second = crawler.arun("https://example.com", None).await;
    assert!(second.success);
    assert_eq!(first.html, second.html, "cache must be bit-identical");
    assert_eq!(
        crawler.browser_manager().pages_opened(),
        pages_after_first,
        "a cache hit must not open a page"
    );
    crawler.close().await.expect("close");
}

#[tokio::test]
#[ignore = "requires local Chrome and network"]
async fn bypass_mode_opens_a_page_every_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .cache_mode(CacheMode::Bypass)
        .build()
        .expect("config");
    crawler.arun("https://example.com", Some(config.clone())).await;
    crawler.arun("https://example.com", Some(config)).await;
    assert!(crawler.browser_manager().pages_opened() >= 2);
    crawler.close().await.expect("close");
}

#[tokio::test]
#[ignore = "requires local Chrome and network"]
async fn many_url_rate_limit_spaces_same_domain_crawls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .cache_mode(CacheMode::Bypass)
        .mean_delay_ms(500)
        .max_range_ms(0)
        .semaphore_count(4)
        .build()
        .expect("config");

    let urls = vec![
        "https://example.com/".to_string(),
        "https://example.com/?page=2".to_string(),
    ];
    let started = Instant::now();
    let results = crawler.arun_many(&urls, Some(config)).await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(results[0].url, urls[0]);
    assert_eq!(results[1].url, urls[1]);
    assert!(
        started.elapsed() >= Duration::from_millis(500),
        "second same-domain crawl must start at least mean_delay later"
    );
    crawler.close().await.expect("close");
}

#[tokio::test]
#[ignore = "requires local Chrome and network"]
async fn sessions_are_reused_and_killable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let config = CrawlerRunConfig::builder()
        .cache_mode(CacheMode::Bypass)
        .session_id("live-session")
        .build()
        .expect("config");
    let first = crawler.arun("https://example.com", Some(config.clone())).await;
    assert!(first.success);
    assert_eq!(first.session_id.as_deref(), Some("live-session"));
    let pages_after_first = crawler.browser_manager().pages_opened();

    // Same session: the pooled page is reused, not reopened.
    let second = crawler.arun("https://example.com/?again", Some(config)).await;
    assert!(second.success);
    assert_eq!(crawler.browser_manager().pages_opened(), pages_after_first);

    // Late content flows through the session handle.
    let html = crawler
        .delayed_html("live-session", Duration::from_millis(200))
        .await
        .expect("delayed html");
    assert!(!html.is_empty());

    crawler.kill_session("live-session").await.expect("kill");
    assert_eq!(crawler.browser_manager().session_count().await, 0);
    crawler.close().await.expect("close");
}

#[tokio::test]
#[ignore = "requires local Chrome"]
async fn session_ttl_evicts_idle_sessions() {
    let manager = BrowserManager::new(BrowserConfig::default())
        .with_session_ttl(Duration::from_millis(300));
    let _page = manager
        .get_page(Some("ttl-session"), None)
        .await
        .expect("page");
    assert_eq!(manager.session_count().await, 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    manager.evict_expired_sessions().await;
    assert_eq!(
        manager.session_count().await,
        0,
        "a session last used at t must be gone after t + TTL"
    );
    manager.shutdown().await.expect("shutdown");
}

#[tokio::test]
#[ignore = "requires local Chrome and network"]
async fn semaphore_bounds_concurrent_navigations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    {
        let active = Arc::clone(&active);
        let max_seen = Arc::clone(&max_seen);
        crawler.hooks().on(HookPoint::BeforeGoto, move |_page| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            async { Ok(()) }
        });
    }
    {
        let active = Arc::clone(&active);
        crawler.hooks().on(HookPoint::AfterGoto, move |_page| {
            active.fetch_sub(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }

    let config = CrawlerRunConfig::builder()
        .cache_mode(CacheMode::Bypass)
        .semaphore_count(2)
        .mean_delay_ms(0)
        .build()
        .expect("config");
    let urls: Vec<String> = (0..6)
        .map(|i| format!("https://example.com/?n={i}"))
        .collect();
    crawler.arun_many(&urls, Some(config)).await;

    assert!(
        max_seen.load(Ordering::SeqCst) <= 2,
        "no more than semaphore_count pages may navigate at once"
    );
    crawler.close().await.expect("close");
}

#[tokio::test]
#[ignore = "requires local Chrome and network"]
async fn screenshot_rerun_after_text_only_cache_misses_and_refetches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crawler = crawler(&dir).await;

    let first = crawler.arun("https://example.com", None).await;
    assert!(first.success);
    assert!(first.screenshot.is_none());

    let config = CrawlerRunConfig::builder().screenshot(true).build().expect("config");
    let second = crawler.arun("https://example.com", Some(config)).await;
    assert!(second.success);
    assert!(
        second.screenshot.is_some(),
        "screenshot request must force a fresh fetch that captures one"
    );
    crawler.close().await.expect("close");
}
