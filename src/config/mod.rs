//! Immutable configuration objects.
//!
//! `BrowserConfig` lives for the whole process; `CrawlerRunConfig` is built
//! per request. Both are constructed through builders that validate, and
//! both round-trip through serde. A keyword-map layer (`from_kwargs`) keeps
//! older call sites working: unknown keys warn, legacy cache flags reduce to
//! [`CacheMode`] with a deprecation warning.

mod browser;
mod run;

pub use browser::{BrowserConfig, BrowserConfigBuilder, BrowserKind, ProxyConfig, UserAgentMode};
pub use run::{CacheMode, CrawlerRunConfig, CrawlerRunConfigBuilder, ParserKind, WaitUntil};
