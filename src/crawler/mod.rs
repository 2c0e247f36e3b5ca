//! The crawl orchestrator: public entry points, cache integration,
//! concurrent fan-out and per-domain politeness.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

use crate::browser::{BrowserManager, HookRegistry};
use crate::cache::CacheStore;
use crate::config::{BrowserConfig, CacheMode, CrawlerRunConfig};
use crate::error::{CrawlError, error_context};
use crate::logger::{CrawlLogger, LogTag};
use crate::markdown::MarkdownGenerator;
use crate::models::CrawlResult;
use crate::scraping::WebScrapingStrategy;
use crate::strategy::BrowserCrawlerStrategy;
use crate::url_ref::UrlRef;
use crate::utils::extract_domain;

/// Asynchronous web crawler.
///
/// One instance owns the browser manager, the cache store and all mutable
/// orchestration state (per-domain last-hit map, global bypass flag). Peer
/// crawls share nothing else.
pub struct AsyncWebCrawler {
    manager: Arc<BrowserManager>,
    strategy: BrowserCrawlerStrategy,
    scraper: WebScrapingStrategy,
    cache: CacheStore,
    logger: CrawlLogger,
    domain_last_hit: DashMap<String, Instant>,
    /// Process-wide "always fetch fresh" override; explicit instance state,
    /// not a module global.
    always_bypass_cache: bool,
}

impl std::fmt::Debug for AsyncWebCrawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncWebCrawler")
            .field("manager", &self.manager)
            .field("always_bypass_cache", &self.always_bypass_cache)
            .finish()
    }
}

impl AsyncWebCrawler {
    /// Create a crawler with the default cache location
    /// (`~/.crawlmark`, overridable via `CRAWLMARK_BASE_DIRECTORY`).
    pub async fn new(browser_config: BrowserConfig) -> anyhow::Result<Self> {
        Self::with_base_dir(browser_config, CacheStore::default_base_dir()).await
    }

    /// Create a crawler whose cache and log live under `base_dir`.
    pub async fn with_base_dir(
        browser_config: BrowserConfig,
        base_dir: impl Into<std::path::PathBuf>,
    ) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        let verbose = browser_config.verbose();
        let cache = CacheStore::open(&base_dir).await?;
        let manager = Arc::new(BrowserManager::new(browser_config));
        Ok(Self {
            strategy: BrowserCrawlerStrategy::new(Arc::clone(&manager)),
            manager,
            scraper: WebScrapingStrategy,
            cache,
            logger: CrawlLogger::new(&base_dir, verbose),
            domain_last_hit: DashMap::new(),
            always_bypass_cache: false,
        })
    }

    /// Force every crawl through a fresh fetch, regardless of run config.
    #[must_use]
    pub fn always_bypass_cache(mut self, bypass: bool) -> Self {
        self.always_bypass_cache = bypass;
        self
    }

    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        self.manager.hooks()
    }

    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    #[must_use]
    pub fn browser_manager(&self) -> &Arc<BrowserManager> {
        &self.manager
    }

    /// Crawl one URL. Never panics or rethrows: failures come back as a
    /// `CrawlResult` with `success=false` and a diagnostic message.
    pub async fn arun(&self, url: &str, config: Option<CrawlerRunConfig>) -> CrawlResult {
        let config = config.unwrap_or_default();
        let started = Instant::now();
        match self.arun_inner(url, &config).await {
            Ok(result) => {
                let status = result
                    .status_code
                    .map_or_else(|| "ok".to_string(), |s| s.to_string());
                let tag = if result.success {
                    LogTag::Complete
                } else {
                    LogTag::Error
                };
                self.logger
                    .url_status(tag, url, &status, started.elapsed())
                    .await;
                result
            }
            Err(e) => {
                let message = error_context("AsyncWebCrawler::arun", &e);
                self.logger
                    .url_status(LogTag::Error, url, "failed", started.elapsed())
                    .await;
                CrawlResult::failure(url, message)
            }
        }
    }

    async fn arun_inner(
        &self,
        url: &str,
        config: &CrawlerRunConfig,
    ) -> Result<CrawlResult, CrawlError> {
        let target = UrlRef::parse(url)?;

        let cache_mode = if self.always_bypass_cache {
            CacheMode::Bypass
        } else {
            config.cache_mode
        };

        if cache_mode.reads()
            && let Some(cached) = self.cache_lookup(url, config).await
        {
            self.logger
                .message(LogTag::Cache, &format!("hit for {url}"))
                .await;
            return Ok(cached);
        }

        let fetch_started = Instant::now();
        let response = self.strategy.crawl(&target, url, config).await?;
        self.logger
            .url_status(
                LogTag::Fetch,
                url,
                &response
                    .status_code
                    .map_or_else(|| "-".to_string(), |s| s.to_string()),
                fetch_started.elapsed(),
            )
            .await;

        let result = self.run_pipeline(url, &target, response, config).await?;

        if cache_mode.writes() && result.success {
            if let Err(e) = self.cache.write(&result).await {
                // Cache failures never fail the crawl.
                self.logger
                    .message(LogTag::Cache, &format!("write failed for {url}: {e:#}"))
                    .await;
            }
        }
        Ok(result)
    }

    /// A cached row is only usable when every requested optional artifact
    /// was cached with it; pdfs are never cached, so a pdf request always
    /// refetches.
    async fn cache_lookup(&self, url: &str, config: &CrawlerRunConfig) -> Option<CrawlResult> {
        if config.pdf {
            return None;
        }
        let cached = match self.cache.read(url).await {
            Ok(cached) => cached?,
            Err(e) => {
                debug!(url, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        if config.screenshot && cached.screenshot.is_none() {
            return None;
        }
        Some(cached)
    }

    /// Scrape, filter, markdownize and extract; assemble the result.
    async fn run_pipeline(
        &self,
        url: &str,
        target: &UrlRef,
        response: crate::models::AsyncCrawlResponse,
        config: &CrawlerRunConfig,
    ) -> Result<CrawlResult, CrawlError> {
        let base_url = match target {
            UrlRef::Web(parsed) => Some(parsed.clone()),
            UrlRef::LocalFile(_) => Url::parse(url).ok(),
            // raw: literals have no resolvable origin.
            UrlRef::RawHtml(_) | UrlRef::Cache(_) => None,
        };

        let scrape_started = Instant::now();
        let scraped = if response.html.is_empty() {
            crate::scraping::ScrapeOutput::default()
        } else {
            self.scraper.scrape(&response.html, base_url.as_ref(), config)?
        };
        self.logger
            .url_status(LogTag::Scrape, url, "done", scrape_started.elapsed())
            .await;

        let generator = MarkdownGenerator::new(config.markdown_options.clone());
        let markdown_v2 = if scraped.cleaned_html.is_empty() {
            crate::models::MarkdownGenerationResult::default()
        } else {
            generator.generate(
                &scraped.cleaned_html,
                base_url.as_ref(),
                config.content_filter.as_ref(),
            )?
        };

        let extracted_content = match (&config.extraction_strategy, &config.chunking_strategy) {
            (Some(strategy), _) => {
                let extract_started = Instant::now();
                let extracted = strategy.extract(url, &scraped.cleaned_html)?;
                self.logger
                    .url_status(LogTag::Extract, url, "done", extract_started.elapsed())
                    .await;
                Some(extracted)
            }
            // A bare chunking strategy emits the chunks themselves, for
            // callers that feed them to an external extractor.
            (None, Some(chunking)) => {
                let strategy =
                    crate::extraction::ExtractionStrategy::Chunked(chunking.clone());
                Some(strategy.extract(url, &scraped.cleaned_html)?)
            }
            (None, None) => None,
        };

        // An empty fetch is a failure for web targets; raw: literals may
        // legitimately be empty.
        let success = !response.html.is_empty() || matches!(target, UrlRef::RawHtml(_));

        Ok(CrawlResult {
            url: url.to_string(),
            html: response.html,
            cleaned_html: scraped.cleaned_html,
            markdown: markdown_v2.raw_markdown.clone(),
            markdown_v2: Some(markdown_v2),
            extracted_content,
            media: scraped.media,
            links: scraped.links,
            metadata: scraped.metadata,
            screenshot: response.screenshot,
            pdf: response.pdf,
            response_headers: response.response_headers,
            status_code: response.status_code,
            ssl_certificate: response.ssl_certificate,
            session_id: response.session_id,
            downloaded_files: response.downloaded_files,
            error_message: None,
            success,
        })
    }

    /// Crawl many URLs with bounded concurrency; results preserve input
    /// order and per-URL failures never disturb their peers.
    pub async fn arun_many(
        &self,
        urls: &[String],
        config: Option<CrawlerRunConfig>,
    ) -> Vec<CrawlResult> {
        let config = config.unwrap_or_default();
        let semaphore = Arc::new(Semaphore::new(config.semaphore_count.max(1)));

        let mut ordered = Vec::with_capacity(urls.len());
        let futures: Vec<_> = urls
            .iter()
            .map(|url| {
                let semaphore = Arc::clone(&semaphore);
                let config = config.clone();
                async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return CrawlResult::failure(url.clone(), "semaphore closed");
                        }
                    };
                    self.respect_domain_delay(url, &config).await;
                    self.arun(url, Some(config)).await
                }
            })
            .collect();

        for result in futures::future::join_all(futures).await {
            ordered.push(result);
        }
        ordered
    }

    /// Per-domain politeness: a second hit inside the mean-delay window
    /// sleeps mean-delay plus uniform jitter before dispatch.
    async fn respect_domain_delay(&self, url: &str, config: &CrawlerRunConfig) {
        if config.mean_delay_ms == 0 {
            return;
        }
        let Some(domain) = extract_domain(url) else {
            return;
        };
        let mean = Duration::from_millis(config.mean_delay_ms);
        let pause = self.domain_last_hit.get(&domain).and_then(|last| {
            (last.elapsed() < mean).then(|| {
                let jitter = if config.max_range_ms == 0 {
                    0
                } else {
                    rand::rng().random_range(0..config.max_range_ms)
                };
                mean + Duration::from_millis(jitter)
            })
        });
        if let Some(pause) = pause {
            debug!(domain, pause_ms = pause.as_millis() as u64, "rate limiting");
            tokio::time::sleep(pause).await;
        }
        // Last-writer-wins is fine here; the map only spaces dispatches.
        self.domain_last_hit.insert(domain, Instant::now());
    }

    /// Re-read a pooled session's page after `delay`.
    ///
    /// This replaces any notion of results holding live page handles:
    /// callers that expect late-arriving content keep a session open, ask
    /// for its HTML again, then kill the session.
    pub async fn delayed_html(&self, session_id: &str, delay: Duration) -> Result<String, CrawlError> {
        tokio::time::sleep(delay).await;
        let page = self
            .manager
            .session_page(session_id)
            .await
            .map_err(|e| CrawlError::Browser(format!("{e:#}")))?;
        page.content()
            .await
            .map_err(|e| CrawlError::Browser(format!("failed to re-read content: {e}")))
    }

    /// Close a pooled session explicitly.
    pub async fn kill_session(&self, session_id: &str) -> Result<(), CrawlError> {
        self.manager
            .kill_session(session_id)
            .await
            .map_err(|e| CrawlError::Browser(format!("{e:#}")))
    }

    /// Shut down the browser and release every session.
    pub async fn close(&self) -> Result<(), CrawlError> {
        self.manager
            .shutdown()
            .await
            .map_err(|e| CrawlError::Browser(format!("{e:#}")))
    }
}
