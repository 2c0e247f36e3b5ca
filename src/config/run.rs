//! Per-request crawl configuration.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extraction::{ChunkingStrategy, ExtractionStrategy};
use crate::filters::ContentFilter;
use crate::markdown::MarkdownOptions;

/// Cache policy for a single crawl.
///
/// `Bypass` and `Disabled` behave identically (neither read nor write);
/// `Bypass` documents "I want a fresh fetch", `Disabled` documents "caching
/// is off here".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Read if present, write on miss.
    #[default]
    Enabled,
    /// Neither read nor write.
    Disabled,
    /// Read, never write.
    ReadOnly,
    /// Write, never read.
    WriteOnly,
    /// Neither read nor write; fresh fetch requested.
    Bypass,
}

impl CacheMode {
    #[must_use]
    pub const fn reads(&self) -> bool {
        matches!(self, Self::Enabled | Self::ReadOnly)
    }

    #[must_use]
    pub const fn writes(&self) -> bool {
        matches!(self, Self::Enabled | Self::WriteOnly)
    }
}

/// Navigation completion condition passed to the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

/// How the scraper treats the incoming HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    /// Full document parse; scraping scopes to `<body>`.
    #[default]
    Document,
    /// Treat the input as a fragment: no body scoping, the whole tree is
    /// the scrape scope. For snippets and partial pages.
    Fragment,
}

/// Default page operation timeout (ms).
pub const DEFAULT_PAGE_TIMEOUT_MS: u64 = 60_000;

/// Default bound on concurrent crawls in the many-URL flow.
pub const DEFAULT_SEMAPHORE_COUNT: usize = 5;

/// Immutable per-request configuration.
///
/// Strategy handles (`extraction_strategy`, `content_filter`, …) are carried
/// by value as enum variants; dispatch is by variant, never by downcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerRunConfig {
    /// Blocks with fewer words than this are dropped during cleaning.
    pub word_count_threshold: usize,
    #[serde(skip)]
    pub extraction_strategy: Option<ExtractionStrategy>,
    #[serde(skip)]
    pub chunking_strategy: Option<ChunkingStrategy>,
    pub markdown_options: MarkdownOptions,
    #[serde(skip)]
    pub content_filter: Option<ContentFilter>,
    /// Emit only text content; markup-heavy artifacts are skipped.
    pub only_text: bool,
    /// Scope all scraping to this selector's matches. Zero matches fail.
    pub css_selector: Option<String>,
    pub excluded_tags: Vec<String>,
    pub excluded_selectors: Vec<String>,
    pub keep_data_attributes: bool,
    pub remove_forms: bool,
    pub prettify: bool,
    pub parser_kind: ParserKind,
    pub fetch_ssl_cert: bool,
    pub cache_mode: CacheMode,
    pub session_id: Option<String>,
    pub wait_until: WaitUntil,
    pub page_timeout_ms: u64,
    /// Raw selector, `css:` prefix, `js:` prefix, or a bare JS function.
    pub wait_for: Option<String>,
    pub wait_for_images: bool,
    pub delay_before_return_html_ms: u64,
    /// Per-domain politeness: consecutive hits to one domain are spaced by
    /// at least this many milliseconds…
    pub mean_delay_ms: u64,
    /// …plus a uniform jitter in `[0, max_range_ms)`.
    pub max_range_ms: u64,
    pub semaphore_count: usize,
    /// JavaScript run after navigation, in order.
    pub js_code: Vec<String>,
    /// Skip navigation entirely; only run scripts on the session's page.
    pub js_only: bool,
    pub ignore_body_visibility: bool,
    pub scan_full_page: bool,
    pub scroll_delay_ms: u64,
    pub process_iframes: bool,
    pub remove_overlay_elements: bool,
    pub simulate_user: bool,
    pub override_navigator: bool,
    /// Shorthand turning on simulate-user, override-navigator, the stealth
    /// init scripts and a random user agent together.
    pub magic: bool,
    pub adjust_viewport_to_content: bool,
    pub screenshot: bool,
    pub screenshot_wait_for_ms: u64,
    /// Above this page height the capture clamps the viewport first.
    pub screenshot_height_threshold: u32,
    pub pdf: bool,
    /// Minimum surrounding words before an image gets a text description.
    pub image_description_min_word_threshold: usize,
    pub image_score_threshold: i32,
    pub exclude_external_images: bool,
    pub exclude_social_media_domains: bool,
    pub exclude_external_links: bool,
    pub exclude_social_media_links: bool,
    pub exclude_domains: Vec<String>,
    pub verbose: bool,
    pub log_console: bool,
}

impl Default for CrawlerRunConfig {
    fn default() -> Self {
        Self {
            word_count_threshold: 1,
            extraction_strategy: None,
            chunking_strategy: None,
            markdown_options: MarkdownOptions::default(),
            content_filter: None,
            only_text: false,
            css_selector: None,
            excluded_tags: Vec::new(),
            excluded_selectors: Vec::new(),
            keep_data_attributes: false,
            remove_forms: false,
            prettify: false,
            parser_kind: ParserKind::Document,
            fetch_ssl_cert: false,
            cache_mode: CacheMode::Enabled,
            session_id: None,
            wait_until: WaitUntil::DomContentLoaded,
            page_timeout_ms: DEFAULT_PAGE_TIMEOUT_MS,
            wait_for: None,
            wait_for_images: false,
            delay_before_return_html_ms: 0,
            mean_delay_ms: 100,
            max_range_ms: 300,
            semaphore_count: DEFAULT_SEMAPHORE_COUNT,
            js_code: Vec::new(),
            js_only: false,
            ignore_body_visibility: true,
            scan_full_page: false,
            scroll_delay_ms: 200,
            process_iframes: false,
            remove_overlay_elements: false,
            simulate_user: false,
            override_navigator: false,
            magic: false,
            adjust_viewport_to_content: false,
            screenshot: false,
            screenshot_wait_for_ms: 0,
            screenshot_height_threshold: 20_000,
            pdf: false,
            image_description_min_word_threshold: 50,
            image_score_threshold: 3,
            exclude_external_images: false,
            exclude_social_media_domains: false,
            exclude_external_links: false,
            exclude_social_media_links: false,
            exclude_domains: Vec::new(),
            verbose: true,
            log_console: false,
        }
    }
}

impl CrawlerRunConfig {
    #[must_use]
    pub fn builder() -> CrawlerRunConfigBuilder {
        CrawlerRunConfigBuilder::default()
    }

    /// Whether `magic` (or the individual flags) ask for user simulation.
    #[must_use]
    pub const fn simulates_user(&self) -> bool {
        self.simulate_user || self.magic
    }

    /// Whether the navigator override init script should be injected.
    #[must_use]
    pub const fn overrides_navigator(&self) -> bool {
        self.override_navigator || self.simulate_user || self.magic
    }

    /// Build a run config from a loosely-typed keyword map.
    ///
    /// Kept for compatibility with older call sites. Unknown keys are
    /// ignored with a warning. The legacy cache flags are honored here and
    /// only here, reduced to a [`CacheMode`] with a deprecation warning;
    /// combining them with an explicit `cache_mode` is an error.
    pub fn from_kwargs(kwargs: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut known = serde_json::Map::new();
        let mut legacy_mode: Option<CacheMode> = None;
        let mut explicit_mode = false;

        for (key, value) in kwargs {
            match key.as_str() {
                "bypass_cache" | "disable_cache" | "no_cache_read" | "no_cache_write" => {
                    if !value.as_bool().unwrap_or(false) {
                        continue;
                    }
                    warn!(flag = %key, "legacy cache flag is deprecated, use cache_mode");
                    let reduced = match key.as_str() {
                        "bypass_cache" => CacheMode::Bypass,
                        "disable_cache" => CacheMode::Disabled,
                        "no_cache_read" => CacheMode::WriteOnly,
                        _ => CacheMode::ReadOnly,
                    };
                    match legacy_mode {
                        None => legacy_mode = Some(reduced),
                        Some(existing) if existing == reduced => {}
                        Some(existing) => {
                            return Err(anyhow!(
                                "conflicting legacy cache flags reduce to {existing:?} and {reduced:?}"
                            ));
                        }
                    }
                }
                "cache_mode" => {
                    explicit_mode = true;
                    known.insert(key.clone(), value.clone());
                }
                _ if Self::is_known_key(key) => {
                    known.insert(key.clone(), value.clone());
                }
                _ => {
                    warn!(key = %key, "ignoring unknown crawler run config key");
                }
            }
        }

        if explicit_mode && legacy_mode.is_some() {
            return Err(anyhow!(
                "cache_mode conflicts with legacy cache flags; pass only cache_mode"
            ));
        }

        let mut config: Self = serde_json::from_value(serde_json::Value::Object(known))
            .map_err(|e| anyhow!("invalid crawler run config: {e}"))?;
        if let Some(mode) = legacy_mode {
            config.cache_mode = mode;
        }
        if config.magic {
            config = config.expand_magic();
        }
        Ok(config)
    }

    fn is_known_key(key: &str) -> bool {
        // Serde field names of this struct, minus the skipped handles.
        const KEYS: &[&str] = &[
            "word_count_threshold",
            "markdown_options",
            "only_text",
            "css_selector",
            "excluded_tags",
            "excluded_selectors",
            "keep_data_attributes",
            "remove_forms",
            "prettify",
            "parser_kind",
            "fetch_ssl_cert",
            "cache_mode",
            "session_id",
            "wait_until",
            "page_timeout_ms",
            "wait_for",
            "wait_for_images",
            "delay_before_return_html_ms",
            "mean_delay_ms",
            "max_range_ms",
            "semaphore_count",
            "js_code",
            "js_only",
            "ignore_body_visibility",
            "scan_full_page",
            "scroll_delay_ms",
            "process_iframes",
            "remove_overlay_elements",
            "simulate_user",
            "override_navigator",
            "magic",
            "adjust_viewport_to_content",
            "screenshot",
            "screenshot_wait_for_ms",
            "screenshot_height_threshold",
            "pdf",
            "image_description_min_word_threshold",
            "image_score_threshold",
            "exclude_external_images",
            "exclude_social_media_domains",
            "exclude_external_links",
            "exclude_social_media_links",
            "exclude_domains",
            "verbose",
            "log_console",
        ];
        KEYS.contains(&key)
    }

    fn expand_magic(mut self) -> Self {
        self.simulate_user = true;
        self.override_navigator = true;
        self
    }
}

/// Fluent builder for [`CrawlerRunConfig`].
#[derive(Debug, Default)]
pub struct CrawlerRunConfigBuilder {
    config: CrawlerRunConfig,
}

impl CrawlerRunConfigBuilder {
    #[must_use]
    pub fn word_count_threshold(mut self, n: usize) -> Self {
        self.config.word_count_threshold = n;
        self
    }

    #[must_use]
    pub fn extraction_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.config.extraction_strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn chunking_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.chunking_strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn markdown_options(mut self, options: MarkdownOptions) -> Self {
        self.config.markdown_options = options;
        self
    }

    #[must_use]
    pub fn content_filter(mut self, filter: ContentFilter) -> Self {
        self.config.content_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn only_text(mut self, on: bool) -> Self {
        self.config.only_text = on;
        self
    }

    #[must_use]
    pub fn css_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.css_selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn excluded_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config
            .excluded_tags
            .extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn excluded_selectors(
        mut self,
        selectors: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.config
            .excluded_selectors
            .extend(selectors.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn keep_data_attributes(mut self, keep: bool) -> Self {
        self.config.keep_data_attributes = keep;
        self
    }

    #[must_use]
    pub fn remove_forms(mut self, remove: bool) -> Self {
        self.config.remove_forms = remove;
        self
    }

    #[must_use]
    pub fn prettify(mut self, on: bool) -> Self {
        self.config.prettify = on;
        self
    }

    #[must_use]
    pub fn parser_kind(mut self, kind: ParserKind) -> Self {
        self.config.parser_kind = kind;
        self
    }

    #[must_use]
    pub fn fetch_ssl_cert(mut self, fetch: bool) -> Self {
        self.config.fetch_ssl_cert = fetch;
        self
    }

    #[must_use]
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.config.cache_mode = mode;
        self
    }

    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.config.session_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn wait_until(mut self, condition: WaitUntil) -> Self {
        self.config.wait_until = condition;
        self
    }

    #[must_use]
    pub fn page_timeout_ms(mut self, ms: u64) -> Self {
        self.config.page_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn wait_for(mut self, expr: impl Into<String>) -> Self {
        self.config.wait_for = Some(expr.into());
        self
    }

    #[must_use]
    pub fn wait_for_images(mut self, wait: bool) -> Self {
        self.config.wait_for_images = wait;
        self
    }

    #[must_use]
    pub fn delay_before_return_html_ms(mut self, ms: u64) -> Self {
        self.config.delay_before_return_html_ms = ms;
        self
    }

    #[must_use]
    pub fn mean_delay_ms(mut self, ms: u64) -> Self {
        self.config.mean_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn max_range_ms(mut self, ms: u64) -> Self {
        self.config.max_range_ms = ms;
        self
    }

    #[must_use]
    pub fn semaphore_count(mut self, n: usize) -> Self {
        self.config.semaphore_count = n;
        self
    }

    #[must_use]
    pub fn js_code(mut self, code: impl Into<String>) -> Self {
        self.config.js_code.push(code.into());
        self
    }

    #[must_use]
    pub fn js_only(mut self, on: bool) -> Self {
        self.config.js_only = on;
        self
    }

    #[must_use]
    pub fn ignore_body_visibility(mut self, ignore: bool) -> Self {
        self.config.ignore_body_visibility = ignore;
        self
    }

    #[must_use]
    pub fn scan_full_page(mut self, on: bool) -> Self {
        self.config.scan_full_page = on;
        self
    }

    #[must_use]
    pub fn scroll_delay_ms(mut self, ms: u64) -> Self {
        self.config.scroll_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn process_iframes(mut self, on: bool) -> Self {
        self.config.process_iframes = on;
        self
    }

    #[must_use]
    pub fn remove_overlay_elements(mut self, on: bool) -> Self {
        self.config.remove_overlay_elements = on;
        self
    }

    #[must_use]
    pub fn simulate_user(mut self, on: bool) -> Self {
        self.config.simulate_user = on;
        self
    }

    #[must_use]
    pub fn override_navigator(mut self, on: bool) -> Self {
        self.config.override_navigator = on;
        self
    }

    #[must_use]
    pub fn magic(mut self, on: bool) -> Self {
        self.config.magic = on;
        self
    }

    #[must_use]
    pub fn adjust_viewport_to_content(mut self, on: bool) -> Self {
        self.config.adjust_viewport_to_content = on;
        self
    }

    #[must_use]
    pub fn screenshot(mut self, on: bool) -> Self {
        self.config.screenshot = on;
        self
    }

    #[must_use]
    pub fn screenshot_wait_for_ms(mut self, ms: u64) -> Self {
        self.config.screenshot_wait_for_ms = ms;
        self
    }

    #[must_use]
    pub fn pdf(mut self, on: bool) -> Self {
        self.config.pdf = on;
        self
    }

    #[must_use]
    pub fn image_description_min_word_threshold(mut self, n: usize) -> Self {
        self.config.image_description_min_word_threshold = n;
        self
    }

    #[must_use]
    pub fn image_score_threshold(mut self, score: i32) -> Self {
        self.config.image_score_threshold = score;
        self
    }

    #[must_use]
    pub fn exclude_external_images(mut self, on: bool) -> Self {
        self.config.exclude_external_images = on;
        self
    }

    #[must_use]
    pub fn exclude_social_media_domains(mut self, on: bool) -> Self {
        self.config.exclude_social_media_domains = on;
        self
    }

    #[must_use]
    pub fn exclude_external_links(mut self, on: bool) -> Self {
        self.config.exclude_external_links = on;
        self
    }

    #[must_use]
    pub fn exclude_social_media_links(mut self, on: bool) -> Self {
        self.config.exclude_social_media_links = on;
        self
    }

    #[must_use]
    pub fn exclude_domains(mut self, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config
            .exclude_domains
            .extend(domains.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    #[must_use]
    pub fn log_console(mut self, on: bool) -> Self {
        self.config.log_console = on;
        self
    }

    /// Validate and produce the final config.
    pub fn build(self) -> Result<CrawlerRunConfig> {
        let mut config = self.config;
        if config.semaphore_count == 0 {
            return Err(anyhow!("semaphore_count must be at least 1"));
        }
        if config.page_timeout_ms == 0 {
            return Err(anyhow!("page_timeout_ms must be non-zero"));
        }
        if config.js_only && config.session_id.is_none() {
            return Err(anyhow!("js_only requires a session_id to reuse a page"));
        }
        if let Some(selector) = &config.css_selector {
            if selector.trim().is_empty() {
                return Err(anyhow!("css_selector must not be blank"));
            }
        }
        if config.magic {
            config = config.expand_magic();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_mode_read_write_matrix() {
        assert!(CacheMode::Enabled.reads() && CacheMode::Enabled.writes());
        assert!(CacheMode::ReadOnly.reads() && !CacheMode::ReadOnly.writes());
        assert!(!CacheMode::WriteOnly.reads() && CacheMode::WriteOnly.writes());
        assert!(!CacheMode::Bypass.reads() && !CacheMode::Bypass.writes());
        assert!(!CacheMode::Disabled.reads() && !CacheMode::Disabled.writes());
    }

    #[test]
    fn magic_expands_component_flags() {
        let config = CrawlerRunConfig::builder().magic(true).build().unwrap();
        assert!(config.simulate_user);
        assert!(config.override_navigator);
        assert!(config.simulates_user());
        assert!(config.overrides_navigator());
    }

    #[test]
    fn js_only_requires_session() {
        assert!(CrawlerRunConfig::builder().js_only(true).build().is_err());
        assert!(
            CrawlerRunConfig::builder()
                .js_only(true)
                .session_id("s1")
                .build()
                .is_ok()
        );
    }

    #[test]
    fn kwargs_ignores_unknown_keys() {
        let kwargs = serde_json::json!({
            "screenshot": true,
            "definitely_not_a_key": 42,
        });
        let config =
            CrawlerRunConfig::from_kwargs(kwargs.as_object().expect("object literal")).unwrap();
        assert!(config.screenshot);
    }

    #[test]
    fn kwargs_reduces_legacy_flags() {
        let kwargs = serde_json::json!({ "bypass_cache": true });
        let config =
            CrawlerRunConfig::from_kwargs(kwargs.as_object().expect("object literal")).unwrap();
        assert_eq!(config.cache_mode, CacheMode::Bypass);

        let kwargs = serde_json::json!({ "no_cache_write": true });
        let config =
            CrawlerRunConfig::from_kwargs(kwargs.as_object().expect("object literal")).unwrap();
        assert_eq!(config.cache_mode, CacheMode::ReadOnly);
    }

    #[test]
    fn kwargs_rejects_conflicting_cache_specs() {
        let kwargs = serde_json::json!({
            "cache_mode": "enabled",
            "bypass_cache": true,
        });
        assert!(CrawlerRunConfig::from_kwargs(kwargs.as_object().expect("object literal")).is_err());

        let kwargs = serde_json::json!({
            "bypass_cache": true,
            "disable_cache": true,
        });
        assert!(CrawlerRunConfig::from_kwargs(kwargs.as_object().expect("object literal")).is_err());
    }
}
