//! Screenshot and PDF export.

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, PrintToPdfParams,
};
use tracing::warn;

use crate::error::CrawlError;
use crate::strategy::js_scripts;

/// A single dark pixel, the capture of last resort when even the error page
/// cannot be rendered.
const FALLBACK_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Capture a full-page PNG and return it base64-encoded.
///
/// Pages taller than `height_threshold` first get their viewport clamped to
/// the threshold; capture-beyond-viewport then composites the full page
/// without allocating a giant surface up front.
pub async fn capture(
    page: &Page,
    height_threshold: u32,
    viewport_width: u32,
) -> Result<String, CrawlError> {
    let content_height = page
        .evaluate(js_scripts::CONTENT_SIZE_SCRIPT)
        .await
        .ok()
        .and_then(|r| r.into_value::<serde_json::Value>().ok())
        .and_then(|v| v.get("height").and_then(serde_json::Value::as_u64))
        .unwrap_or(0) as u32;

    if content_height > height_threshold {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport_width))
            .height(i64::from(height_threshold))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| CrawlError::Browser(format!("invalid viewport params: {e}")))?;
        if let Err(e) = page.execute(params).await {
            warn!("viewport clamp before screenshot failed: {e}");
        }
    }

    let params = CaptureScreenshotParams {
        format: Some(CaptureScreenshotFormat::Png),
        capture_beyond_viewport: Some(true),
        ..Default::default()
    };
    let bytes = page
        .screenshot(params)
        .await
        .map_err(|e| CrawlError::Browser(format!("screenshot failed: {e}")))?;
    Ok(BASE64.encode(bytes))
}

/// Render a black error frame with the failure text and capture it.
///
/// Used when the real capture failed: callers still get a PNG, plus the
/// error in `CrawlResult.error_message` when fatal. Falls back to a 1×1
/// dark pixel if the scratch render fails too.
pub async fn error_frame(page: &Page, error: &str) -> String {
    let message = html_escape::encode_text(error);
    let html = format!(
        "<html><body style=\"background:#000;color:#f44;font-family:monospace;\
         padding:2em;\"><h1>Screenshot failed</h1><pre>{message}</pre></body></html>"
    );
    let rendered = async {
        page.set_content(html).await.ok()?;
        let params = CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Png),
            ..Default::default()
        };
        page.screenshot(params).await.ok()
    }
    .await;

    match rendered {
        Some(bytes) => BASE64.encode(bytes),
        None => {
            warn!("error-frame render failed, returning fallback pixel");
            FALLBACK_PNG_BASE64.to_string()
        }
    }
}

/// Export the page as PDF bytes.
pub async fn export_pdf(page: &Page) -> Result<Vec<u8>, CrawlError> {
    page.pdf(PrintToPdfParams::default())
        .await
        .context("pdf export failed")
        .map_err(CrawlError::Other)
}
