//! Crawl lifecycle hooks.
//!
//! Callers attach async callbacks at fixed points of the per-URL flow. Hook
//! order within one crawl is fixed: before-goto → after-goto →
//! on-execution-started → before-retrieve-html → before-return-html, with
//! the browser-level points firing around session setup. Hook failures
//! propagate and fail the crawl.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chromiumoxide::Page;
use futures::future::BoxFuture;

use crate::error::CrawlError;

/// Recognized hook points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    OnBrowserCreated,
    OnUserAgentUpdated,
    OnExecutionStarted,
    BeforeGoto,
    AfterGoto,
    BeforeRetrieveHtml,
    BeforeReturnHtml,
}

impl HookPoint {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OnBrowserCreated => "on_browser_created",
            Self::OnUserAgentUpdated => "on_user_agent_updated",
            Self::OnExecutionStarted => "on_execution_started",
            Self::BeforeGoto => "before_goto",
            Self::AfterGoto => "after_goto",
            Self::BeforeRetrieveHtml => "before_retrieve_html",
            Self::BeforeReturnHtml => "before_return_html",
        }
    }
}

/// A hook callback. Synchronous work simply returns a ready future.
pub type HookFn =
    Arc<dyn Fn(Page) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static>;

/// Registry of hook callbacks, dispatched in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<HookPoint, Vec<HookFn>>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(&str, usize)> = self
            .hooks
            .read()
            .map(|map| map.iter().map(|(k, v)| (k.name(), v.len())).collect())
            .unwrap_or_default();
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}

impl HookRegistry {
    /// Attach a callback to `point`.
    pub fn on<F, Fut>(&self, point: HookPoint, callback: F)
    where
        F: Fn(Page) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let hook: HookFn = Arc::new(move |page| Box::pin(callback(page)));
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.entry(point).or_default().push(hook);
        }
    }

    /// Run every callback registered at `point` against `page`.
    pub async fn dispatch(&self, point: HookPoint, page: &Page) -> Result<(), CrawlError> {
        let callbacks: Vec<HookFn> = self
            .hooks
            .read()
            .map(|map| map.get(&point).cloned().unwrap_or_default())
            .unwrap_or_default();
        for callback in callbacks {
            callback(page.clone()).await.map_err(|e| CrawlError::Hook {
                hook: point.name(),
                message: format!("{e:#}"),
            })?;
        }
        Ok(())
    }

    /// Whether anything is registered at `point` (used to skip page clones).
    #[must_use]
    pub fn has(&self, point: HookPoint) -> bool {
        self.hooks
            .read()
            .map(|map| map.get(&point).is_some_and(|v| !v.is_empty()))
            .unwrap_or(false)
    }
}
