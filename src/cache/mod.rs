//! Persistent result cache.
//!
//! Large text/blob fields are content-addressed files on disk; a SQLite row
//! per URL holds the hashes plus the small JSON-inlined fields. Write order
//! is files first, row last, so a committed row always points at existing
//! content. A read that finds a referenced file missing treats the row as
//! absent and deletes it so the next write repairs the entry.
//!
//! On-disk layout under the base directory:
//!
//! ```text
//! crawler.log                 line-oriented crawl log
//! cache/{url-hash}            raw page HTML (legacy page-level cache)
//! cache/{url-hash}.meta       JSON {response_headers, status_code}
//! html_content/{sha}          one file per unique raw page HTML
//! cleaned_html/{sha}          one file per unique cleaned-html
//! markdown_content/{sha}      one per unique markdown
//! extracted_content/{sha}     one per unique extraction
//! screenshots/{sha}           PNG bytes
//! index.db                    relational index
//! ```
//!
//! The legacy `cache/` pair is written through on every write but reads
//! only serve from the content-addressed files; the legacy file is the
//! repair source when a row's html content file has gone missing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::models::{CrawlResult, Links, Media};
use crate::url_ref::{content_hash, url_hash};

/// Environment variable overriding the default `~/.crawlmark` root.
pub const BASE_DIR_ENV: &str = "CRAWLMARK_BASE_DIRECTORY";

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS crawl_index (
    url TEXT NOT NULL,
    url_hash TEXT PRIMARY KEY,
    response_headers TEXT NOT NULL DEFAULT '{}',
    status_code INTEGER,
    success INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    media TEXT NOT NULL DEFAULT '{}',
    links TEXT NOT NULL DEFAULT '{}',
    metadata TEXT NOT NULL DEFAULT '{}',
    downloaded_files TEXT NOT NULL DEFAULT '[]',
    html_hash TEXT,
    cleaned_html_hash TEXT,
    markdown_hash TEXT,
    extracted_content_hash TEXT,
    screenshot_hash TEXT,
    created_at INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_crawl_index_url ON crawl_index(url);
";

/// Columns the reader depends on; missing ones are added by migration.
const REQUIRED_COLUMNS: &[(&str, &str)] = &[
    ("downloaded_files", "TEXT NOT NULL DEFAULT '[]'"),
    ("extracted_content_hash", "TEXT"),
    ("screenshot_hash", "TEXT"),
    ("created_at", "INTEGER NOT NULL DEFAULT 0"),
];

/// Content folders, paired with the row column that references them.
const HTML_DIR: &str = "html_content";
const CLEANED_HTML_DIR: &str = "cleaned_html";
const MARKDOWN_DIR: &str = "markdown_content";
const EXTRACTED_DIR: &str = "extracted_content";
const SCREENSHOTS_DIR: &str = "screenshots";
const LEGACY_CACHE_DIR: &str = "cache";

/// Content-addressed store with a relational index.
#[derive(Debug, Clone)]
pub struct CacheStore {
    base_dir: PathBuf,
    pool: SqlitePool,
}

impl CacheStore {
    /// Resolve the base directory: env override, else `~/.crawlmark`.
    #[must_use]
    pub fn default_base_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(BASE_DIR_ENV) {
            return PathBuf::from(dir).join(".crawlmark");
        }
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".crawlmark")
    }

    /// Open (or create) the store rooted at `base_dir`.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        for dir in [
            LEGACY_CACHE_DIR,
            HTML_DIR,
            CLEANED_HTML_DIR,
            MARKDOWN_DIR,
            EXTRACTED_DIR,
            SCREENSHOTS_DIR,
        ] {
            tokio::fs::create_dir_all(base_dir.join(dir))
                .await
                .with_context(|| format!("failed to create cache directory '{dir}'"))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(base_dir.join("index.db"))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("failed to open cache index database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to initialize cache schema")?;

        let store = Self { base_dir, pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Add any columns an older index file is missing. Rows predating a
    /// column keep its default and fail the completeness check on read,
    /// which schedules them for re-fetch naturally.
    async fn migrate(&self) -> Result<()> {
        let rows = sqlx::query("PRAGMA table_info(crawl_index)")
            .fetch_all(&self.pool)
            .await
            .context("failed to inspect cache schema")?;
        let existing: Vec<String> = rows
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        for (column, definition) in REQUIRED_COLUMNS {
            if existing.iter().any(|c| c == column) {
                continue;
            }
            debug!(column, "migrating cache index: adding missing column");
            sqlx::query(&format!(
                "ALTER TABLE crawl_index ADD COLUMN {column} {definition}"
            ))
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to add column '{column}'"))?;
        }
        Ok(())
    }

    /// Persist a successful crawl result.
    ///
    /// Every referenced content file is written (idempotently) before the
    /// row is committed.
    pub async fn write(&self, result: &CrawlResult) -> Result<()> {
        let key = url_hash(&result.url);

        let html_hash = self.write_content(HTML_DIR, result.html.as_bytes()).await?;
        self.write_legacy_page(&key, result).await?;

        let cleaned_html_hash = self
            .write_content(CLEANED_HTML_DIR, result.cleaned_html.as_bytes())
            .await?;
        let markdown_hash = match &result.markdown_v2 {
            Some(md) => {
                let payload = serde_json::to_vec(md).context("failed to encode markdown")?;
                Some(self.write_content(MARKDOWN_DIR, &payload).await?)
            }
            None => None,
        };
        let extracted_content_hash = match &result.extracted_content {
            Some(content) => Some(self.write_content(EXTRACTED_DIR, content.as_bytes()).await?),
            None => None,
        };
        let screenshot_hash = match &result.screenshot {
            Some(encoded) => {
                let bytes = BASE64
                    .decode(encoded)
                    .context("screenshot is not valid base64")?;
                Some(self.write_content(SCREENSHOTS_DIR, &bytes).await?)
            }
            None => None,
        };

        sqlx::query(
            r"
            INSERT OR REPLACE INTO crawl_index (
                url, url_hash, response_headers, status_code, success,
                error_message, media, links, metadata, downloaded_files,
                html_hash, cleaned_html_hash, markdown_hash,
                extracted_content_hash, screenshot_hash, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&result.url)
        .bind(&key)
        .bind(serde_json::to_string(&result.response_headers)?)
        .bind(result.status_code.map(i64::from))
        .bind(i64::from(result.success))
        .bind(&result.error_message)
        .bind(serde_json::to_string(&result.media)?)
        .bind(serde_json::to_string(&result.links)?)
        .bind(serde_json::to_string(&result.metadata)?)
        .bind(serde_json::to_string(&result.downloaded_files)?)
        .bind(&html_hash)
        .bind(&cleaned_html_hash)
        .bind(&markdown_hash)
        .bind(&extracted_content_hash)
        .bind(&screenshot_hash)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("failed to upsert cache row")?;

        Ok(())
    }

    /// Look up a URL. Returns `None` on miss or on an invalid row (missing
    /// content file); invalid rows are deleted so the next write repairs.
    pub async fn read(&self, url: &str) -> Result<Option<CrawlResult>> {
        let key = url_hash(url);
        let row = sqlx::query(
            r"
            SELECT url, response_headers, status_code, success, error_message,
                   media, links, metadata, downloaded_files,
                   html_hash, cleaned_html_hash, markdown_hash,
                   extracted_content_hash, screenshot_hash
            FROM crawl_index WHERE url_hash = ?
            ",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query cache index")?;

        let Some(row) = row else {
            return Ok(None);
        };

        match self.load_row(url, &key, &row).await {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                warn!(url, error = %e, "cache row invalid, scheduling repair");
                self.delete_row(&key).await;
                Ok(None)
            }
        }
    }

    async fn load_row(
        &self,
        url: &str,
        key: &str,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<CrawlResult> {
        let html = match row.get::<Option<String>, _>("html_hash") {
            Some(hash) => match self.read_content_string(HTML_DIR, &hash).await {
                Ok(html) => html,
                // Content file gone: repair it from the legacy page file.
                Err(_) => self.repair_html_from_legacy(key, &hash).await?,
            },
            // Rows from before html was content-addressed.
            None => self.read_legacy_html(key).await?,
        };

        let cleaned_html = match row.get::<Option<String>, _>("cleaned_html_hash") {
            Some(hash) => self.read_content_string(CLEANED_HTML_DIR, &hash).await?,
            None => String::new(),
        };
        let markdown_v2 = match row.get::<Option<String>, _>("markdown_hash") {
            Some(hash) => {
                let payload = self.read_content(MARKDOWN_DIR, &hash).await?;
                Some(serde_json::from_slice(&payload).context("corrupt markdown payload")?)
            }
            None => None,
        };
        let extracted_content = match row.get::<Option<String>, _>("extracted_content_hash") {
            Some(hash) => Some(self.read_content_string(EXTRACTED_DIR, &hash).await?),
            None => None,
        };
        let screenshot = match row.get::<Option<String>, _>("screenshot_hash") {
            Some(hash) => {
                let bytes = self.read_content(SCREENSHOTS_DIR, &hash).await?;
                Some(BASE64.encode(bytes))
            }
            None => None,
        };

        let media: Media = serde_json::from_str(row.get::<String, _>("media").as_str())
            .unwrap_or_default();
        let links: Links = serde_json::from_str(row.get::<String, _>("links").as_str())
            .unwrap_or_default();
        let metadata: HashMap<String, String> =
            serde_json::from_str(row.get::<String, _>("metadata").as_str()).unwrap_or_default();
        let response_headers: HashMap<String, String> =
            serde_json::from_str(row.get::<String, _>("response_headers").as_str())
                .unwrap_or_default();
        let downloaded_files: Vec<PathBuf> =
            serde_json::from_str(row.get::<String, _>("downloaded_files").as_str())
                .unwrap_or_default();

        let markdown = markdown_v2
            .as_ref()
            .map(|md: &crate::models::MarkdownGenerationResult| md.raw_markdown.clone())
            .unwrap_or_default();

        Ok(CrawlResult {
            url: url.to_string(),
            html,
            cleaned_html,
            markdown,
            markdown_v2,
            extracted_content,
            media,
            links,
            metadata,
            screenshot,
            pdf: None,
            response_headers,
            status_code: row
                .get::<Option<i64>, _>("status_code")
                .and_then(|s| u16::try_from(s).ok()),
            ssl_certificate: None,
            session_id: None,
            downloaded_files,
            error_message: row.get::<Option<String>, _>("error_message"),
            success: row.get::<i64, _>("success") != 0,
        })
    }

    async fn read_legacy_html(&self, key: &str) -> Result<String> {
        tokio::fs::read_to_string(self.base_dir.join(LEGACY_CACHE_DIR).join(key))
            .await
            .context("page html file missing")
    }

    /// Restore a missing html content file from the legacy page file. The
    /// legacy copy must still hash to what the row references; anything
    /// else means both copies are gone or stale and the row is invalid.
    async fn repair_html_from_legacy(&self, key: &str, expected_hash: &str) -> Result<String> {
        let html = self.read_legacy_html(key).await?;
        if content_hash(html.as_bytes()) != expected_hash {
            anyhow::bail!("legacy page file no longer matches the row's html hash");
        }
        debug!(hash = expected_hash, "repairing html content file from legacy page cache");
        let restored = self.write_content(HTML_DIR, html.as_bytes()).await?;
        debug_assert_eq!(restored, expected_hash);
        Ok(html)
    }

    /// Write the legacy page-level cache pair (`cache/{hash}` + `.meta`).
    ///
    /// Keyed by URL, not content, so a re-crawl overwrites.
    async fn write_legacy_page(&self, key: &str, result: &CrawlResult) -> Result<()> {
        let dir = self.base_dir.join(LEGACY_CACHE_DIR);
        tokio::fs::write(dir.join(key), result.html.as_bytes())
            .await
            .context("failed to write page html")?;
        let meta = serde_json::json!({
            "response_headers": result.response_headers,
            "status_code": result.status_code,
        });
        tokio::fs::write(dir.join(format!("{key}.meta")), serde_json::to_vec(&meta)?)
            .await
            .context("failed to write page meta")?;
        Ok(())
    }

    async fn write_content(&self, folder: &str, content: &[u8]) -> Result<String> {
        let hash = content_hash(content);
        let path = self.base_dir.join(folder).join(&hash);
        write_if_absent(&path, content).await?;
        Ok(hash)
    }

    async fn read_content(&self, folder: &str, hash: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.base_dir.join(folder).join(hash))
            .await
            .with_context(|| format!("content file {folder}/{hash} missing"))
    }

    async fn read_content_string(&self, folder: &str, hash: &str) -> Result<String> {
        let bytes = self.read_content(folder, hash).await?;
        String::from_utf8(bytes).with_context(|| format!("content file {folder}/{hash} not utf-8"))
    }

    async fn delete_row(&self, key: &str) {
        if let Err(e) = sqlx::query("DELETE FROM crawl_index WHERE url_hash = ?")
            .bind(key)
            .execute(&self.pool)
            .await
        {
            warn!(error = %e, "failed to delete invalid cache row");
        }
    }

    /// Drop all rows and every content file.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM crawl_index")
            .execute(&self.pool)
            .await
            .context("failed to clear cache index")?;
        for dir in [
            LEGACY_CACHE_DIR,
            HTML_DIR,
            CLEANED_HTML_DIR,
            MARKDOWN_DIR,
            EXTRACTED_DIR,
            SCREENSHOTS_DIR,
        ] {
            let path = self.base_dir.join(dir);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(&path)
                    .await
                    .with_context(|| format!("failed to remove '{dir}'"))?;
                tokio::fs::create_dir_all(&path).await?;
            }
        }
        Ok(())
    }

    /// Compact the index file.
    pub async fn flush(&self) -> Result<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("failed to vacuum cache index")?;
        Ok(())
    }

    /// Number of cached URLs.
    pub async fn size(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM crawl_index")
            .fetch_one(&self.pool)
            .await
            .context("failed to count cache rows")?;
        Ok(row.get::<i64, _>("n").max(0) as u64)
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Content files are immutable once written; an existing file with the same
/// hash is the same content, so rewriting is a no-op.
async fn write_if_absent(path: &Path, content: &[u8]) -> Result<()> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to commit {}", path.display()))?;
    Ok(())
}
