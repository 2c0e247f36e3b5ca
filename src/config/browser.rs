//! Process-lifetime browser configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Which browser engine to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    /// Canonical executable name used when probing the PATH.
    #[must_use]
    pub const fn executable_hint(&self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }
}

/// Proxy settings: a bare server, or server plus credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyConfig {
    #[must_use]
    pub fn server(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: None,
            password: None,
        }
    }
}

/// How the user agent is chosen per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserAgentMode {
    /// Use the configured string (or the engine default when none is set).
    #[default]
    Fixed,
    /// Draw a fresh coherent UA from the generator for each context.
    Random,
}

/// Immutable browser-process configuration.
///
/// Built once, shared by every crawl the process performs. Fields mirror
/// what the launcher and context setup consume; per-request knobs live on
/// [`crate::config::CrawlerRunConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub(crate) browser_kind: BrowserKind,
    pub(crate) headless: bool,
    /// Spawn the browser binary ourselves and attach over the debug
    /// protocol instead of letting the driver launch it.
    pub(crate) use_managed_browser: bool,
    pub(crate) user_data_dir: Option<PathBuf>,
    /// Release channel passed to the launcher (e.g. "chrome-beta").
    pub(crate) channel: Option<String>,
    pub(crate) proxy: Option<ProxyConfig>,
    pub(crate) viewport_width: u32,
    pub(crate) viewport_height: u32,
    pub(crate) accept_downloads: bool,
    pub(crate) downloads_path: Option<PathBuf>,
    /// Serialized storage state (cookies + origins) applied to new contexts.
    pub(crate) storage_state: Option<serde_json::Value>,
    pub(crate) ignore_https_errors: bool,
    pub(crate) java_script_enabled: bool,
    /// Seconds to sleep before closing the browser, for debugging.
    pub(crate) sleep_on_close: bool,
    pub(crate) verbose: bool,
    pub(crate) cookies: Vec<serde_json::Value>,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) user_agent_mode: UserAgentMode,
    /// Disables images, JavaScript and GPU for fast text-only fetches.
    pub(crate) text_mode: bool,
    /// Disables background networking/timers and other non-essential work.
    pub(crate) light_mode: bool,
    pub(crate) extra_args: Vec<String>,
    pub(crate) debugging_port: u16,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser_kind: BrowserKind::Chromium,
            headless: true,
            use_managed_browser: false,
            user_data_dir: None,
            channel: None,
            proxy: None,
            viewport_width: 1080,
            viewport_height: 600,
            accept_downloads: false,
            downloads_path: None,
            storage_state: None,
            ignore_https_errors: true,
            java_script_enabled: true,
            sleep_on_close: false,
            verbose: true,
            cookies: Vec::new(),
            headers: HashMap::new(),
            user_agent: None,
            user_agent_mode: UserAgentMode::Fixed,
            text_mode: false,
            light_mode: false,
            extra_args: Vec::new(),
            debugging_port: 9222,
        }
    }
}

impl BrowserConfig {
    #[must_use]
    pub fn builder() -> BrowserConfigBuilder {
        BrowserConfigBuilder::default()
    }

    #[must_use]
    pub const fn browser_kind(&self) -> BrowserKind {
        self.browser_kind
    }

    #[must_use]
    pub const fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub const fn use_managed_browser(&self) -> bool {
        self.use_managed_browser
    }

    #[must_use]
    pub const fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }

    #[must_use]
    pub const fn accept_downloads(&self) -> bool {
        self.accept_downloads
    }

    #[must_use]
    pub fn downloads_path(&self) -> Option<&PathBuf> {
        self.downloads_path.as_ref()
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub const fn user_agent_mode(&self) -> UserAgentMode {
        self.user_agent_mode
    }

    #[must_use]
    pub const fn debugging_port(&self) -> u16 {
        self.debugging_port
    }

    #[must_use]
    pub const fn text_mode(&self) -> bool {
        self.text_mode
    }

    #[must_use]
    pub const fn light_mode(&self) -> bool {
        self.light_mode
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub const fn ignore_https_errors(&self) -> bool {
        self.ignore_https_errors
    }

    #[must_use]
    pub const fn java_script_enabled(&self) -> bool {
        self.java_script_enabled
    }

    #[must_use]
    pub const fn sleep_on_close(&self) -> bool {
        self.sleep_on_close
    }

    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub fn cookies(&self) -> &[serde_json::Value] {
        &self.cookies
    }

    #[must_use]
    pub fn storage_state(&self) -> Option<&serde_json::Value> {
        self.storage_state.as_ref()
    }

    #[must_use]
    pub fn extra_args_list(&self) -> &[String] {
        &self.extra_args
    }

    #[must_use]
    pub fn user_data_dir_path(&self) -> Option<&PathBuf> {
        self.user_data_dir.as_ref()
    }

    #[must_use]
    pub fn channel_name(&self) -> Option<&str> {
        self.channel.as_deref()
    }
}

/// Fluent builder for [`BrowserConfig`].
#[derive(Debug, Default)]
pub struct BrowserConfigBuilder {
    config: BrowserConfig,
}

impl BrowserConfigBuilder {
    #[must_use]
    pub fn browser_kind(mut self, kind: BrowserKind) -> Self {
        self.config.browser_kind = kind;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn use_managed_browser(mut self, managed: bool) -> Self {
        self.config.use_managed_browser = managed;
        self
    }

    #[must_use]
    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.user_data_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.config.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    #[must_use]
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    #[must_use]
    pub fn accept_downloads(mut self, accept: bool) -> Self {
        self.config.accept_downloads = accept;
        self
    }

    #[must_use]
    pub fn downloads_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.downloads_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn storage_state(mut self, state: serde_json::Value) -> Self {
        self.config.storage_state = Some(state);
        self
    }

    #[must_use]
    pub fn ignore_https_errors(mut self, ignore: bool) -> Self {
        self.config.ignore_https_errors = ignore;
        self
    }

    #[must_use]
    pub fn java_script_enabled(mut self, enabled: bool) -> Self {
        self.config.java_script_enabled = enabled;
        self
    }

    #[must_use]
    pub fn sleep_on_close(mut self, sleep: bool) -> Self {
        self.config.sleep_on_close = sleep;
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    #[must_use]
    pub fn cookie(mut self, cookie: serde_json::Value) -> Self {
        self.config.cookies.push(cookie);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = Some(ua.into());
        self
    }

    #[must_use]
    pub fn user_agent_mode(mut self, mode: UserAgentMode) -> Self {
        self.config.user_agent_mode = mode;
        self
    }

    #[must_use]
    pub fn text_mode(mut self, on: bool) -> Self {
        self.config.text_mode = on;
        self
    }

    #[must_use]
    pub fn light_mode(mut self, on: bool) -> Self {
        self.config.light_mode = on;
        self
    }

    #[must_use]
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config
            .extra_args
            .extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn debugging_port(mut self, port: u16) -> Self {
        self.config.debugging_port = port;
        self
    }

    /// Validate and produce the final config.
    pub fn build(self) -> Result<BrowserConfig> {
        if self.config.viewport_width == 0 || self.config.viewport_height == 0 {
            return Err(anyhow!("viewport dimensions must be non-zero"));
        }
        if self.config.use_managed_browser && self.config.debugging_port == 0 {
            return Err(anyhow!("managed browser requires a debugging port"));
        }
        if let Some(proxy) = &self.config.proxy {
            if proxy.server.is_empty() {
                return Err(anyhow!("proxy server must not be empty"));
            }
            if proxy.username.is_some() != proxy.password.is_some() {
                return Err(anyhow!("proxy credentials require both user and pass"));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_headless_chromium() {
        let config = BrowserConfig::default();
        assert_eq!(config.browser_kind(), BrowserKind::Chromium);
        assert!(config.headless());
        assert!(!config.use_managed_browser());
        assert_eq!(config.viewport(), (1080, 600));
    }

    #[test]
    fn builder_rejects_zero_viewport() {
        let result = BrowserConfig::builder().viewport(0, 600).build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_half_configured_proxy_credentials() {
        let result = BrowserConfig::builder()
            .proxy(ProxyConfig {
                server: "http://proxy:8080".into(),
                username: Some("user".into()),
                password: None,
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = BrowserConfig::builder()
            .headless(false)
            .viewport(1920, 1080)
            .user_agent("TestAgent/1.0")
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: BrowserConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.viewport(), (1920, 1080));
        assert_eq!(back.user_agent(), Some("TestAgent/1.0"));
    }
}
