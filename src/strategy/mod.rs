//! Crawler strategy: one URL in, an [`AsyncCrawlResponse`] out.
//!
//! `file://` and `raw:` targets skip all browser work unless an artifact
//! (screenshot/pdf) forces a render; web targets run the full navigation
//! path in [`navigation`].

mod js_scripts;
mod navigation;
mod screenshot;
mod wait;

pub use wait::smart_wait;

use std::sync::Arc;

use tracing::debug;

use crate::browser::BrowserManager;
use crate::config::{CrawlerRunConfig, UserAgentMode};
use crate::error::CrawlError;
use crate::models::AsyncCrawlResponse;
use crate::url_ref::UrlRef;
use crate::user_agent::UserAgentGenerator;

/// Magic mode draws a fresh random user agent for every page opened for the
/// run; pooled sessions keep the agent they were created with.
pub(crate) fn magic_user_agent(config: &CrawlerRunConfig) -> Option<String> {
    config
        .magic
        .then(|| UserAgentGenerator::new(UserAgentMode::Random, None).generate())
}

/// Drives the browser manager to fetch one target.
#[derive(Debug, Clone)]
pub struct BrowserCrawlerStrategy {
    manager: Arc<BrowserManager>,
}

impl BrowserCrawlerStrategy {
    #[must_use]
    pub fn new(manager: Arc<BrowserManager>) -> Self {
        Self { manager }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<BrowserManager> {
        &self.manager
    }

    /// Fetch `target` according to `config`.
    pub async fn crawl(
        &self,
        target: &UrlRef,
        raw_url: &str,
        config: &CrawlerRunConfig,
    ) -> Result<AsyncCrawlResponse, CrawlError> {
        match target {
            UrlRef::Web(_) => navigation::crawl_web(&self.manager, raw_url, config).await,
            UrlRef::LocalFile(path) => {
                let html = tokio::fs::read_to_string(path).await.map_err(|e| {
                    CrawlError::Config(format!(
                        "local file not found or unreadable: {}: {e}",
                        path.display()
                    ))
                })?;
                self.static_response(html, config).await
            }
            UrlRef::RawHtml(html) => self.static_response(html.clone(), config).await,
            UrlRef::Cache(_) => Err(CrawlError::Config(
                "cache:// urls are resolved by the orchestrator, not fetched".into(),
            )),
        }
    }

    /// Response for content we already hold. A requested screenshot or pdf
    /// still needs a render pass through a scratch page.
    async fn static_response(
        &self,
        html: String,
        config: &CrawlerRunConfig,
    ) -> Result<AsyncCrawlResponse, CrawlError> {
        let mut response = AsyncCrawlResponse {
            html,
            status_code: Some(200),
            ..AsyncCrawlResponse::default()
        };

        if (config.screenshot || config.pdf) && !response.html.is_empty() {
            let user_agent = magic_user_agent(config);
            let page = self
                .manager
                .get_page(config.session_id.as_deref(), user_agent.as_deref())
                .await
                .map_err(|e| CrawlError::Browser(format!("failed to obtain page: {e:#}")))?;
            page.set_content(response.html.clone())
                .await
                .map_err(|e| CrawlError::Browser(format!("failed to render html: {e}")))?;

            if config.screenshot {
                let (viewport_width, _) = self.manager.config().viewport();
                response.screenshot = Some(
                    match screenshot::capture(
                        &page,
                        config.screenshot_height_threshold,
                        viewport_width,
                    )
                    .await
                    {
                        Ok(encoded) => encoded,
                        Err(e) => {
                            debug!("static screenshot failed: {e}");
                            screenshot::error_frame(&page, &e.to_string()).await
                        }
                    },
                );
            }
            if config.pdf {
                response.pdf = Some(screenshot::export_pdf(&page).await?);
            }
            if config.session_id.is_none() {
                let _ = page.close().await;
            }
        }

        response.session_id = config.session_id.clone();
        Ok(response)
    }
}
