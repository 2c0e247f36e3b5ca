//! Tagged crawl logging.
//!
//! Every crawl emits one status line per URL: a bracketed tag, the URL, the
//! outcome and the elapsed time. Lines go through `tracing` for subscribers
//! and are appended uncolored to `{base}/crawler.log`.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{error, info};

/// ANSI color escapes for terminal-facing lines.
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Tags mirror the crawl phases so a log grep tells the story of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Fetch,
    Scrape,
    Extract,
    Complete,
    Cache,
    Error,
}

impl LogTag {
    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Fetch => "FETCH",
            Self::Scrape => "SCRAPE",
            Self::Extract => "EXTRACT",
            Self::Complete => "COMPLETE",
            Self::Cache => "CACHE",
            Self::Error => "ERROR",
        }
    }

    #[must_use]
    const fn color(&self) -> &'static str {
        match self {
            Self::Fetch => CYAN,
            Self::Scrape | Self::Extract => YELLOW,
            Self::Complete | Self::Cache => GREEN,
            Self::Error => RED,
        }
    }
}

/// Structured crawl logger with an optional line-oriented file sink.
#[derive(Debug, Clone)]
pub struct CrawlLogger {
    log_file: Option<PathBuf>,
    verbose: bool,
}

impl CrawlLogger {
    /// Logger that writes `crawler.log` under `base_dir`.
    #[must_use]
    pub fn new(base_dir: &std::path::Path, verbose: bool) -> Self {
        Self {
            log_file: Some(base_dir.join("crawler.log")),
            verbose,
        }
    }

    /// Logger without a file sink (tests, embedded use).
    #[must_use]
    pub fn ephemeral(verbose: bool) -> Self {
        Self {
            log_file: None,
            verbose,
        }
    }

    /// One URL-status line: `[TAG] url | status | 1.24s`.
    pub async fn url_status(
        &self,
        tag: LogTag,
        url: &str,
        status: &str,
        elapsed: Duration,
    ) {
        let plain = format!(
            "[{}] {url} | {status} | {:.2}s",
            tag.label(),
            elapsed.as_secs_f64()
        );
        if self.verbose {
            let colored = format!(
                "{}[{}]{} {url} | {status} | {:.2}s",
                tag.color(),
                tag.label(),
                RESET,
                elapsed.as_secs_f64()
            );
            if tag == LogTag::Error {
                error!(target: "crawlmark", "{colored}");
            } else {
                info!(target: "crawlmark", "{colored}");
            }
        }
        self.append_line(&plain).await;
    }

    /// Free-form tagged message (no URL/timing columns).
    pub async fn message(&self, tag: LogTag, text: &str) {
        let plain = format!("[{}] {text}", tag.label());
        if self.verbose {
            if tag == LogTag::Error {
                error!(target: "crawlmark", "{plain}");
            } else {
                info!(target: "crawlmark", "{plain}");
            }
        }
        self.append_line(&plain).await;
    }

    async fn append_line(&self, line: &str) {
        let Some(path) = &self.log_file else {
            return;
        };
        let stamped = format!("{} {line}\n", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"));
        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(stamped.as_bytes()).await
        }
        .await;
        if let Err(e) = result {
            // The log file is best effort; losing a line must not fail a crawl.
            tracing::debug!(error = %e, "failed to append to crawler.log");
        }
    }
}
