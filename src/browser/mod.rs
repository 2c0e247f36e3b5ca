//! Browser ownership: process, contexts, pages and the session pool.
//!
//! The manager exclusively owns every session; callers hold only the opaque
//! session id. Sessions are (context, page, last-used) triples evicted after
//! a TTL, reaped opportunistically on each `get_page` call.

mod hooks;
mod launch;
pub mod stealth;

pub use hooks::{HookPoint, HookRegistry};
pub use launch::{BROWSER_PATH_ENV, LaunchedBrowser, find_browser_executable};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::browser::EventDownloadWillBegin;
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::user_agent::UserAgentGenerator;

/// Default session idle lifetime.
pub const SESSION_TTL: Duration = Duration::from_secs(1800);

/// One pooled session. In embedded mode the context id is ours to dispose;
/// in managed mode pages share the adopted default context.
#[derive(Debug)]
struct Session {
    page: Page,
    context_id: Option<chromiumoxide::cdp::browser_protocol::browser::BrowserContextId>,
    last_used: Instant,
}

/// Owns the browser process and the session pool.
pub struct BrowserManager {
    config: Arc<BrowserConfig>,
    ua_generator: UserAgentGenerator,
    hooks: Arc<HookRegistry>,
    launched: Mutex<Option<LaunchedBrowser>>,
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    session_ttl: Duration,
    /// Total pages ever opened; tests assert cache hits open none.
    pages_opened: AtomicUsize,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for BrowserManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserManager")
            .field("config", &self.config)
            .field("session_ttl", &self.session_ttl)
            .field("pages_opened", &self.pages_opened.load(Ordering::Relaxed))
            .finish()
    }
}

impl BrowserManager {
    #[must_use]
    pub fn new(config: BrowserConfig) -> Self {
        let ua_generator = UserAgentGenerator::new(
            config.user_agent_mode(),
            config.user_agent().map(str::to_string),
        );
        Self {
            config: Arc::new(config),
            ua_generator,
            hooks: Arc::new(HookRegistry::default()),
            launched: Mutex::new(None),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            session_ttl: SESSION_TTL,
            pages_opened: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    #[must_use]
    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Pages opened since startup (session-reuse observability).
    #[must_use]
    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::Relaxed)
    }

    /// Launch the browser if it is not already running.
    pub async fn start(&self) -> Result<()> {
        let mut launched = self.launched.lock().await;
        if launched.is_some() {
            return Ok(());
        }
        let handle = if self.config.use_managed_browser() {
            launch::launch_managed(&self.config).await?
        } else {
            launch::launch_embedded(&self.config).await?
        };
        *launched = Some(handle);
        drop(launched);
        info!(
            managed = self.config.use_managed_browser(),
            "browser started"
        );
        Ok(())
    }

    /// Get a page for `session_id` (or an anonymous one-shot page).
    ///
    /// Known ids refresh their timestamp and return the pooled page. New
    /// pages get the effective user agent, client hints, extra headers,
    /// viewport and download behavior applied before being handed out.
    pub async fn get_page(
        &self,
        session_id: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Page> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Err(anyhow!("browser manager is shutting down"));
        }
        self.start().await?;
        self.reap_expired_sessions();

        if let Some(id) = session_id {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get_mut(id) {
                session.last_used = Instant::now();
                debug!(session = id, "reusing pooled session");
                return Ok(session.page.clone());
            }
        }

        let effective_ua = user_agent
            .map(str::to_string)
            .unwrap_or_else(|| self.ua_generator.generate());
        let (page, context_id) = self.open_page(&effective_ua).await?;

        self.hooks.dispatch(HookPoint::OnUserAgentUpdated, &page).await?;

        if let Some(id) = session_id {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(
                id.to_string(),
                Session {
                    page: page.clone(),
                    context_id,
                    last_used: Instant::now(),
                },
            );
            debug!(session = id, "created pooled session");
        }
        Ok(page)
    }

    /// Read the page of an existing session without creating anything.
    pub async fn session_page(&self, session_id: &str) -> Result<Page> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown session '{session_id}'"))?;
        session.last_used = Instant::now();
        Ok(session.page.clone())
    }

    /// Close a session's page (and its context in embedded mode).
    pub async fn kill_session(&self, session_id: &str) -> Result<()> {
        let session = self.sessions.lock().await.remove(session_id);
        let Some(session) = session else {
            return Ok(());
        };
        if let Err(e) = session.page.close().await {
            warn!(session = session_id, error = %e, "failed to close session page");
        }
        if let Some(context_id) = session.context_id {
            let launched = self.launched.lock().await;
            if let Some(handle) = launched.as_ref() {
                use chromiumoxide::cdp::browser_protocol::target::DisposeBrowserContextParams;
                if let Err(e) = handle
                    .browser
                    .execute(DisposeBrowserContextParams::new(context_id))
                    .await
                {
                    warn!(session = session_id, error = %e, "failed to dispose context");
                }
            }
        }
        debug!(session = session_id, "session killed");
        Ok(())
    }

    async fn open_page(
        &self,
        user_agent: &str,
    ) -> Result<(
        Page,
        Option<chromiumoxide::cdp::browser_protocol::browser::BrowserContextId>,
    )> {
        let launched = self.launched.lock().await;
        let handle = launched
            .as_ref()
            .ok_or_else(|| anyhow!("browser not started"))?;

        // Managed mode adopts the default context; embedded mode isolates
        // each session in its own context.
        let context_id = if self.config.use_managed_browser() {
            None
        } else {
            use chromiumoxide::cdp::browser_protocol::target::CreateBrowserContextParams;
            let mut params = CreateBrowserContextParams::default();
            if let Some(proxy) = self.config.proxy() {
                params.proxy_server = Some(proxy.server.clone());
            }
            match handle.browser.create_browser_context(params).await {
                Ok(id) => Some(id),
                Err(e) => {
                    // Older builds reject context creation; fall back to the
                    // shared context rather than failing the crawl.
                    warn!(error = %e, "isolated context unavailable, using default");
                    None
                }
            }
        };

        let mut target = CreateTargetParams::builder()
            .url("about:blank")
            .build()
            .map_err(|e| anyhow!("invalid target params: {e}"))?;
        target.browser_context_id = context_id.clone();
        let page = handle
            .browser
            .new_page(target)
            .await
            .context("failed to open page")?;
        drop(launched);
        self.pages_opened.fetch_add(1, Ordering::Relaxed);

        self.apply_page_defaults(&page, user_agent).await?;
        self.hooks.dispatch(HookPoint::OnBrowserCreated, &page).await?;
        Ok((page, context_id))
    }

    /// UA + client hints, extra headers, viewport, downloads.
    async fn apply_page_defaults(&self, page: &Page, user_agent: &str) -> Result<()> {
        page.execute(SetUserAgentOverrideParams {
            user_agent: user_agent.to_string(),
            accept_language: Some("en-US,en;q=0.9".to_string()),
            platform: None,
            user_agent_metadata: None,
        })
        .await
        .context("failed to override user agent")?;

        let mut headers = self.config.headers().clone();
        for (name, value) in UserAgentGenerator::client_hints(user_agent) {
            headers.entry(name).or_insert(value);
        }
        if !headers.is_empty() {
            page.execute(SetExtraHttpHeadersParams {
                headers: Headers::new(serde_json::json!(headers)),
            })
            .await
            .context("failed to set extra headers")?;
        }

        let (width, height) = self.config.viewport();
        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(width))
                .height(i64::from(height))
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| anyhow!("invalid viewport params: {e}"))?,
        )
        .await
        .context("failed to set viewport")?;

        self.apply_cookies(page).await;

        if self.config.accept_downloads()
            && let Some(downloads_path) = self.config.downloads_path()
        {
            tokio::fs::create_dir_all(downloads_path)
                .await
                .context("failed to create downloads dir")?;
            page.execute(SetDownloadBehaviorParams {
                behavior: SetDownloadBehaviorBehavior::Allow,
                browser_context_id: None,
                download_path: Some(downloads_path.display().to_string()),
                events_enabled: Some(true),
            })
            .await
            .context("failed to enable downloads")?;
        }
        Ok(())
    }

    /// Configured cookies plus the cookie half of any storage state. A
    /// malformed cookie is logged and skipped, never fatal.
    async fn apply_cookies(&self, page: &Page) {
        use chromiumoxide::cdp::browser_protocol::network::CookieParam;
        use chromiumoxide::cdp::browser_protocol::storage::SetCookiesParams;

        let mut values: Vec<&serde_json::Value> = self.config.cookies().iter().collect();
        let storage_cookies = self
            .config
            .storage_state()
            .and_then(|state| state.get("cookies"))
            .and_then(serde_json::Value::as_array);
        if let Some(storage_cookies) = storage_cookies {
            values.extend(storage_cookies.iter());
        }
        if values.is_empty() {
            return;
        }

        let mut cookies = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_value::<CookieParam>(value.clone()) {
                Ok(cookie) => cookies.push(cookie),
                Err(e) => warn!("skipping malformed cookie: {e}"),
            }
        }
        if cookies.is_empty() {
            return;
        }
        if let Err(e) = page
            .execute(SetCookiesParams {
                cookies,
                browser_context_id: None,
            })
            .await
        {
            warn!("failed to apply configured cookies: {e}");
        }
    }

    /// Watch a page for downloads; resolved paths land in the returned list.
    ///
    /// Duplicate suggested filenames get a ` (n)` style numeric suffix so a
    /// later download never clobbers an earlier one.
    pub async fn watch_downloads(&self, page: &Page) -> Result<Arc<Mutex<Vec<PathBuf>>>> {
        let downloads: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let Some(dir) = self.config.downloads_path().cloned() else {
            return Ok(downloads);
        };
        let mut events = page
            .event_listener::<EventDownloadWillBegin>()
            .await
            .context("failed to attach download listener")?;
        let sink = Arc::clone(&downloads);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let started = Instant::now();
                let safe = sanitize_filename::sanitize(&event.suggested_filename);
                let path = unique_download_path(&dir, &safe).await;
                info!(
                    url = %event.url,
                    file = %path.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "download captured"
                );
                sink.lock().await.push(path);
            }
        });
        Ok(downloads)
    }

    /// Capture the Document response matching `url` from the network stream.
    pub async fn response_listener(
        &self,
        page: &Page,
    ) -> Result<chromiumoxide::listeners::EventStream<EventResponseReceived>> {
        page.event_listener::<EventResponseReceived>()
            .await
            .context("failed to attach response listener")
    }

    /// Drop sessions idle past the TTL. Fire-and-forget.
    fn reap_expired_sessions(&self) {
        let sessions = Arc::clone(&self.sessions);
        let ttl = self.session_ttl;
        tokio::spawn(async move {
            let mut pool = sessions.lock().await;
            let expired: Vec<String> = pool
                .iter()
                .filter(|(_, s)| s.last_used.elapsed() > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            for id in expired {
                if let Some(session) = pool.remove(&id) {
                    debug!(session = %id, "evicting expired session");
                    let _ = session.page.close().await;
                }
            }
        });
    }

    /// Number of live sessions (TTL observability).
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Synchronously reap, for callers that need deterministic eviction.
    pub async fn evict_expired_sessions(&self) {
        let mut pool = self.sessions.lock().await;
        let ttl = self.session_ttl;
        let expired: Vec<String> = pool
            .iter()
            .filter(|(_, s)| s.last_used.elapsed() > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(session) = pool.remove(&id) {
                let _ = session.page.close().await;
            }
        }
    }

    /// Close every session, the browser, and any temp profile we created.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutting_down.store(true, Ordering::Relaxed);

        let session_ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        for id in session_ids {
            let _ = self.kill_session(&id).await;
        }

        let mut launched = self.launched.lock().await;
        if let Some(mut handle) = launched.take() {
            if self.config.sleep_on_close() {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            if let Some(managed) = handle.managed.as_mut() {
                managed.shutting_down.store(true, Ordering::Relaxed);
                managed.supervisor.abort();
            }
            if let Err(e) = handle.browser.close().await {
                warn!(error = %e, "browser close failed");
            }
            let _ = handle.browser.wait().await;
            if let Some(managed) = handle.managed.as_mut() {
                let _ = managed.child.kill().await;
            }
            handle.handler_task.abort();
            if let Some(profile) = handle.temp_profile.take() {
                if let Err(e) = tokio::fs::remove_dir_all(&profile).await {
                    warn!(path = %profile.display(), error = %e, "temp profile cleanup failed");
                }
            }
        }
        info!("browser manager shut down");
        Ok(())
    }
}

/// Find a path under `dir` that does not collide with existing downloads.
async fn unique_download_path(dir: &std::path::Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }
    let (stem, extension) = match filename.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s.to_string(), Some(e.to_string())),
        _ => (filename.to_string(), None),
    };
    for n in 1..1000 {
        let name = match &extension {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(&name);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
    }
    dir.join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unique_download_path_suffixes_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = unique_download_path(dir.path(), "report.pdf").await;
        assert_eq!(first, dir.path().join("report.pdf"));

        tokio::fs::write(&first, b"x").await.expect("write");
        let second = unique_download_path(dir.path(), "report.pdf").await;
        assert_eq!(second, dir.path().join("report (1).pdf"));

        tokio::fs::write(&second, b"y").await.expect("write");
        let third = unique_download_path(dir.path(), "report.pdf").await;
        assert_eq!(third, dir.path().join("report (2).pdf"));
    }

    #[tokio::test]
    async fn unique_download_path_handles_extensionless_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("LICENSE"), b"x")
            .await
            .expect("write");
        let path = unique_download_path(dir.path(), "LICENSE").await;
        assert_eq!(path, dir.path().join("LICENSE (1)"));
    }

    #[test]
    fn manager_reports_config_and_counters() {
        let manager = BrowserManager::new(BrowserConfig::default());
        assert_eq!(manager.pages_opened(), 0);
        assert!(manager.config().headless());
    }
}
