//! The full web navigation path, start to HTML.

use std::collections::HashMap;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, ResourceType};
use chromiumoxide::cdp::browser_protocol::storage::SetCookiesParams;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::browser::{BrowserManager, HookPoint, stealth};
use crate::config::CrawlerRunConfig;
use crate::error::CrawlError;
use crate::models::AsyncCrawlResponse;
use crate::strategy::{js_scripts, screenshot, wait};
use crate::utils::normalize_url;

/// How long the response listener keeps waiting after navigation returns.
const RESPONSE_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Navigate `url` in a page owned by the manager and return the rendered
/// HTML plus response details and optional artifacts.
pub(super) async fn crawl_web(
    manager: &BrowserManager,
    url: &str,
    config: &CrawlerRunConfig,
) -> Result<AsyncCrawlResponse, CrawlError> {
    let page_timeout = Duration::from_millis(config.page_timeout_ms);
    let user_agent = crate::strategy::magic_user_agent(config);
    let page = manager
        .get_page(config.session_id.as_deref(), user_agent.as_deref())
        .await
        .map_err(|e| CrawlError::Browser(format!("failed to obtain page: {e:#}")))?;

    let downloads = if manager.config().accept_downloads() {
        Some(
            manager
                .watch_downloads(&page)
                .await
                .map_err(|e| CrawlError::Browser(format!("download watcher: {e:#}")))?,
        )
    } else {
        None
    };

    let result = drive_page(manager, &page, url, config, page_timeout).await;

    // Anonymous pages close with the crawl; session pages stay pooled.
    if config.session_id.is_none() {
        if let Err(e) = page.close().await {
            debug!("page close failed: {e}");
        }
    }

    let mut response = result?;
    if let Some(downloads) = downloads {
        response.downloaded_files = downloads.lock().await.clone();
    }
    response.session_id = config.session_id.clone();
    Ok(response)
}

async fn drive_page(
    manager: &BrowserManager,
    page: &Page,
    url: &str,
    config: &CrawlerRunConfig,
    page_timeout: Duration,
) -> Result<AsyncCrawlResponse, CrawlError> {
    let hooks = manager.hooks();

    // Step 2: permissive cookie + navigator overrides before any script runs.
    set_permissive_cookie(page, url).await;
    if config.overrides_navigator() {
        stealth::inject(page)
            .await
            .map_err(|e| CrawlError::Browser(format!("stealth injection failed: {e:#}")))?;
    }

    if config.log_console {
        watch_console(page).await;
    }

    // Step 3: navigate (unless js_only re-uses the session's current page).
    let mut status_code = None;
    let mut response_headers = HashMap::new();
    let mut ssl_certificate = None;
    if !config.js_only {
        hooks.dispatch(HookPoint::BeforeGoto, page).await?;

        let capture = spawn_response_capture(manager, page, url).await?;

        tokio::time::timeout(page_timeout, page.goto(url))
            .await
            .map_err(|_| {
                CrawlError::Navigation(format!(
                    "navigation to {url} timed out after {}ms",
                    page_timeout.as_millis()
                ))
            })?
            .map_err(|e| CrawlError::Navigation(format!("navigation to {url} failed: {e}")))?;

        wait::wait_until_ready(page, config.wait_until, page_timeout).await?;

        if let Ok(Some(document)) = tokio::time::timeout(RESPONSE_CAPTURE_TIMEOUT, capture)
            .await
            .map_err(|_| ())
            .and_then(|joined| joined.map_err(|_| ()))
        {
            status_code = Some(document.status);
            response_headers = document.headers;
            if config.fetch_ssl_cert {
                ssl_certificate = document.security_details;
            }
        }

        hooks.dispatch(HookPoint::AfterGoto, page).await?;
    }

    // Step 4: body attached and visible.
    wait::wait_for_body(page, page_timeout, config.ignore_body_visibility).await?;

    // Step 5: image settling, tolerated on timeout.
    if config.wait_for_images || config.adjust_viewport_to_content {
        if let Err(e) = wait::poll_js(
            page,
            js_scripts::IMAGES_COMPLETE_SCRIPT,
            Duration::from_secs(3),
            "images complete",
        )
        .await
        {
            debug!("images never settled: {e}");
        }
    }

    // Step 6: viewport follows content, scaled to fit.
    if config.adjust_viewport_to_content {
        if let Err(e) = adjust_viewport(manager, page).await {
            warn!("viewport adjustment failed: {e}");
        }
    }

    // Step 7: scroll the whole page so lazy content materializes.
    if config.scan_full_page {
        scan_full_page(page, Duration::from_millis(config.scroll_delay_ms)).await;
    }

    // Step 8: user scripts, then simulated gestures.
    for (index, code) in config.js_code.iter().enumerate() {
        page.evaluate(code.as_str()).await.map_err(|e| {
            CrawlError::Navigation(format!("user script #{index} failed: {e}"))
        })?;
    }
    hooks.dispatch(HookPoint::OnExecutionStarted, page).await?;
    if config.simulates_user() {
        if let Err(e) = page.evaluate(js_scripts::SIMULATE_USER_SCRIPT).await {
            debug!("user simulation failed: {e}");
        }
    }

    // Step 9: caller-provided readiness condition.
    if let Some(wait_for) = &config.wait_for {
        wait::smart_wait(page, wait_for, page_timeout).await?;
    }

    // Step 10: intrinsic image dimensions for downstream scoring.
    if let Err(e) = page.evaluate(js_scripts::UPDATE_IMAGE_DIMENSIONS_SCRIPT).await {
        warn!("image dimension update failed: {e}");
    }

    // Step 11: inline same-origin iframes.
    if config.process_iframes {
        match page.evaluate(js_scripts::INLINE_IFRAMES_SCRIPT).await {
            Ok(result) => {
                if let Ok(value) = result.into_value::<serde_json::Value>() {
                    debug!(
                        inlined = value.get("inlined").and_then(serde_json::Value::as_u64),
                        skipped = value.get("skipped").and_then(serde_json::Value::as_u64),
                        "iframe inlining done"
                    );
                }
            }
            Err(e) => warn!("iframe inlining failed: {e}"),
        }
    }

    // Step 12: final settles before reading content.
    hooks.dispatch(HookPoint::BeforeRetrieveHtml, page).await?;
    if config.delay_before_return_html_ms > 0 {
        tokio::time::sleep(Duration::from_millis(config.delay_before_return_html_ms)).await;
    }
    if config.remove_overlay_elements {
        if let Err(e) = page.evaluate(js_scripts::REMOVE_OVERLAYS_SCRIPT).await {
            warn!("overlay removal failed: {e}");
        }
    }

    // Step 13: the HTML itself.
    let html = page
        .content()
        .await
        .map_err(|e| CrawlError::Browser(format!("failed to read page content: {e}")))?;
    hooks.dispatch(HookPoint::BeforeReturnHtml, page).await?;

    // Step 14: optional artifacts.
    let pdf = if config.pdf {
        Some(screenshot::export_pdf(page).await?)
    } else {
        None
    };
    let shot = if config.screenshot {
        if config.screenshot_wait_for_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.screenshot_wait_for_ms)).await;
        }
        let (viewport_width, _) = manager.config().viewport();
        match screenshot::capture(page, config.screenshot_height_threshold, viewport_width).await
        {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                warn!("screenshot capture failed: {e}");
                Some(screenshot::error_frame(page, &e.to_string()).await)
            }
        }
    } else {
        None
    };

    Ok(AsyncCrawlResponse {
        html,
        response_headers,
        status_code,
        screenshot: shot,
        pdf,
        downloaded_files: Vec::new(),
        ssl_certificate,
        session_id: None,
    })
}

/// Forward in-page console calls to the crate log.
async fn watch_console(page: &Page) {
    use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
    match page.event_listener::<EventConsoleApiCalled>().await {
        Ok(mut events) => {
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let parts: Vec<String> = event
                        .args
                        .iter()
                        .filter_map(|arg| arg.value.as_ref().map(ToString::to_string))
                        .collect();
                    debug!(
                        target: "crawlmark::console",
                        kind = ?event.r#type,
                        "{}",
                        parts.join(" ")
                    );
                }
            });
        }
        Err(e) => debug!("console listener unavailable: {e}"),
    }
}

/// Some consent walls bail out early when cookies look disabled.
async fn set_permissive_cookie(page: &Page, url: &str) {
    let cookie = CookieParam::builder()
        .name("cookiesEnabled")
        .value("true")
        .url(url)
        .build();
    match cookie {
        Ok(cookie) => {
            if let Err(e) = page
                .execute(SetCookiesParams {
                    cookies: vec![cookie],
                    browser_context_id: None,
                })
                .await
            {
                debug!("permissive cookie rejected: {e}");
            }
        }
        Err(e) => debug!("permissive cookie invalid for {url}: {e}"),
    }
}

/// What the response listener learned about the Document response.
struct DocumentResponse {
    status: u16,
    headers: HashMap<String, String>,
    security_details: Option<String>,
}

/// Listen for the Document response matching `url` and hand back its
/// status, headers and TLS details.
async fn spawn_response_capture(
    manager: &BrowserManager,
    page: &Page,
    url: &str,
) -> Result<tokio::task::JoinHandle<Option<DocumentResponse>>, CrawlError> {
    let mut events = manager
        .response_listener(page)
        .await
        .map_err(|e| CrawlError::Browser(format!("response listener: {e:#}")))?;
    let target = normalize_url(url);
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event.r#type != ResourceType::Document {
                continue;
            }
            let matches = match (&target, normalize_url(event.response.url.as_str())) {
                (Some(t), Some(r)) => *t == r,
                // Unparseable target: first Document wins.
                _ => true,
            };
            if !matches {
                continue;
            }
            let status = u16::try_from(event.response.status).unwrap_or(0);
            let mut headers = HashMap::new();
            if let Some(map) = event.response.headers.inner().as_object() {
                for (name, value) in map {
                    if let Some(value) = value.as_str() {
                        headers.insert(name.to_lowercase(), value.to_string());
                    }
                }
            }
            let security_details = event
                .response
                .security_details
                .as_ref()
                .and_then(|details| serde_json::to_string(details).ok());
            return Some(DocumentResponse {
                status,
                headers,
                security_details,
            });
        }
        None
    }))
}

/// Read content extents and scale the viewport so the whole page fits.
async fn adjust_viewport(manager: &BrowserManager, page: &Page) -> anyhow::Result<()> {
    let size = page
        .evaluate(js_scripts::CONTENT_SIZE_SCRIPT)
        .await?
        .into_value::<serde_json::Value>()?;
    let content_width = size.get("width").and_then(serde_json::Value::as_u64).unwrap_or(0);
    let content_height = size.get("height").and_then(serde_json::Value::as_u64).unwrap_or(0);
    if content_width == 0 || content_height == 0 {
        return Ok(());
    }
    let (viewport_width, _) = manager.config().viewport();
    let target_height =
        (f64::from(viewport_width) * content_height as f64 / content_width as f64).ceil() as i64;
    let scale = (f64::from(viewport_width) / content_width as f64).min(1.0);

    page.execute(
        SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport_width))
            .height(target_height)
            .device_scale_factor(scale)
            .mobile(false)
            .build()
            .map_err(|e| anyhow::anyhow!("viewport params: {e}"))?,
    )
    .await?;
    debug!(content_width, content_height, scale, "viewport adjusted to content");
    Ok(())
}

/// Viewport-sized scroll steps with the total height re-read each step, so
/// lazy-loaded growth extends the scan. Ends back at the top.
async fn scan_full_page(page: &Page, scroll_delay: Duration) {
    const MAX_STEPS: usize = 100;
    for _ in 0..MAX_STEPS {
        let state = page
            .evaluate(js_scripts::SCROLL_STATE_SCRIPT)
            .await
            .ok()
            .and_then(|r| r.into_value::<serde_json::Value>().ok());
        let (position, total) = match state {
            Some(v) => (
                v.get("position").and_then(serde_json::Value::as_f64).unwrap_or(0.0),
                v.get("total").and_then(serde_json::Value::as_f64).unwrap_or(0.0),
            ),
            None => break,
        };
        if position >= total {
            break;
        }
        if page
            .evaluate("window.scrollBy(0, window.innerHeight)")
            .await
            .is_err()
        {
            break;
        }
        tokio::time::sleep(scroll_delay).await;
    }
    let _ = page.evaluate("window.scrollTo(0, 0)").await;
}
