//! # crawlmark
//!
//! Async Chrome-driven crawling engine that turns pages into LLM-ready
//! artifacts: cleaned HTML, Markdown with numbered citations, structured
//! JSON and media/link inventories.
//!
//! ```no_run
//! use crawlmark::{AsyncWebCrawler, BrowserConfig, CacheMode, CrawlerRunConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let crawler = AsyncWebCrawler::new(BrowserConfig::default()).await?;
//! let config = CrawlerRunConfig::builder()
//!     .cache_mode(CacheMode::Bypass)
//!     .build()?;
//! let result = crawler.arun("https://example.com", Some(config)).await;
//! if result.success {
//!     println!("{}", result.markdown);
//! }
//! crawler.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The four load-bearing subsystems: the orchestrator ([`AsyncWebCrawler`]),
//! the browser/session manager ([`browser::BrowserManager`]), the content
//! pipeline ([`scraping`], [`filters`], [`markdown`], [`extraction`]) and
//! the persistent result cache ([`cache::CacheStore`]).

pub mod browser;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extraction;
pub mod filters;
pub mod logger;
pub mod markdown;
pub mod models;
pub mod scraping;
pub mod strategy;
pub mod url_ref;
pub mod user_agent;
pub mod utils;

pub use browser::{BrowserManager, HookPoint, HookRegistry};
pub use cache::{BASE_DIR_ENV, CacheStore};
pub use config::{
    BrowserConfig, BrowserKind, CacheMode, CrawlerRunConfig, ParserKind, ProxyConfig,
    UserAgentMode, WaitUntil,
};
pub use crawler::AsyncWebCrawler;
pub use error::CrawlError;
pub use extraction::{ChunkingStrategy, ExtractionStrategy, JsonCssSchema, SchemaField};
pub use filters::{Bm25Filter, ContentFilter, PruningFilter, PruningThreshold};
pub use logger::{CrawlLogger, LogTag};
pub use markdown::{MarkdownGenerator, MarkdownOptions};
pub use models::{
    AsyncCrawlResponse, CrawlResult, Link, Links, MarkdownGenerationResult, Media, MediaItem,
};
pub use scraping::{ScrapeOutput, WebScrapingStrategy};
pub use strategy::BrowserCrawlerStrategy;
pub use url_ref::UrlRef;
pub use user_agent::UserAgentGenerator;
