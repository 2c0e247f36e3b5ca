//! Bounded waiting primitives: readiness polling, body visibility and the
//! `wait_for` dispatcher.

use std::time::Duration;

use chromiumoxide::Page;
use tracing::{debug, warn};

use crate::config::WaitUntil;
use crate::error::CrawlError;
use crate::strategy::js_scripts;

/// Poll interval for in-page condition checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Quiet period that counts as "network idle".
const NETWORK_IDLE_GRACE: Duration = Duration::from_millis(500);

/// Evaluate `expr` until it returns truthy or the timeout elapses.
pub async fn poll_js(
    page: &Page,
    expr: &str,
    timeout: Duration,
    what: &str,
) -> Result<(), CrawlError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match page.evaluate(expr).await {
            Ok(result) => {
                if truthy(&result) {
                    return Ok(());
                }
            }
            Err(e) => {
                return Err(CrawlError::Rendering(format!(
                    "evaluation failed while waiting for {what}: {e}"
                )));
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CrawlError::Navigation(format!(
                "timed out after {}ms waiting for {what}",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn truthy(result: &chromiumoxide::js::EvaluationResult) -> bool {
    match result.value() {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(_) => true,
        None => false,
    }
}

/// Wait for the configured navigation completion condition.
pub async fn wait_until_ready(
    page: &Page,
    condition: WaitUntil,
    timeout: Duration,
) -> Result<(), CrawlError> {
    let accept_interactive = matches!(condition, WaitUntil::DomContentLoaded);
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let state = page
            .evaluate(js_scripts::READY_STATE_SCRIPT)
            .await
            .ok()
            .and_then(|r| r.into_value::<String>().ok())
            .unwrap_or_default();
        let ready = match state.as_str() {
            "complete" => true,
            "interactive" => accept_interactive,
            _ => false,
        };
        if ready {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CrawlError::Navigation(format!(
                "page never reached readyState for {condition:?} within {}ms",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    if matches!(condition, WaitUntil::NetworkIdle) {
        tokio::time::sleep(NETWORK_IDLE_GRACE).await;
    }
    Ok(())
}

/// Wait for `<body>` to attach, then for it to be actually visible.
///
/// A visibility timeout is fatal unless `ignore_body_visibility` downgrades
/// it to a logged warning.
pub async fn wait_for_body(
    page: &Page,
    timeout: Duration,
    ignore_body_visibility: bool,
) -> Result<(), CrawlError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if page.find_element("body").await.is_ok() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CrawlError::Navigation(format!(
                "<body> never attached within {}ms",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let visibility_timeout = timeout.min(Duration::from_secs(10));
    match poll_js(
        page,
        js_scripts::BODY_VISIBILITY_SCRIPT,
        visibility_timeout,
        "body visibility",
    )
    .await
    {
        Ok(()) => Ok(()),
        Err(e) if ignore_body_visibility => {
            warn!("body visibility check failed, continuing: {e}");
            Ok(())
        }
        Err(e) => Err(CrawlError::Rendering(format!("body never visible: {e}"))),
    }
}

/// `wait_for` dispatcher.
///
/// `js:EXPR`, a bare arrow function or `function…` polls the expression;
/// `css:SEL` or anything selector-looking waits for the selector, retrying
/// as JS when the selector wait dies with a non-timeout error.
pub async fn smart_wait(page: &Page, wait_for: &str, timeout: Duration) -> Result<(), CrawlError> {
    let trimmed = wait_for.trim();

    if let Some(expr) = trimmed.strip_prefix("js:") {
        return poll_js_callable(page, expr.trim(), timeout).await;
    }
    if looks_like_js(trimmed) {
        return poll_js_callable(page, trimmed, timeout).await;
    }

    let selector = trimmed.strip_prefix("css:").unwrap_or(trimmed).trim();
    match wait_for_selector(page, selector, timeout).await {
        Ok(()) => Ok(()),
        Err(CrawlError::Navigation(msg)) => Err(CrawlError::Navigation(msg)),
        Err(e) => {
            // A selector parse failure may mean it was JS all along.
            debug!("selector wait failed non-fatally ({e}); retrying as js");
            poll_js_callable(page, trimmed, timeout).await
        }
    }
}

fn looks_like_js(expr: &str) -> bool {
    expr.starts_with("()")
        || expr.starts_with("function")
        || expr.starts_with("async ")
        || expr.contains("=>")
}

/// Poll a JS expression that may be a function literal (call it) or a plain
/// expression (evaluate it).
async fn poll_js_callable(page: &Page, expr: &str, timeout: Duration) -> Result<(), CrawlError> {
    let wrapped = if expr.starts_with("()") || expr.starts_with("function") || expr.starts_with("async")
    {
        format!("({expr})()")
    } else {
        expr.to_string()
    };
    poll_js(page, &wrapped, timeout, "wait_for condition").await
}

async fn wait_for_selector(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<(), CrawlError> {
    let escaped = selector.replace('\\', "\\\\").replace('\'', "\\'");
    let expr = format!("document.querySelector('{escaped}') !== null");
    poll_js(page, &expr, timeout, "selector").await.map_err(|e| match e {
        CrawlError::Navigation(msg) => CrawlError::Navigation(msg),
        CrawlError::Rendering(msg) => CrawlError::Rendering(msg),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_detection_covers_the_spec_shapes() {
        assert!(looks_like_js("() => document.title !== ''"));
        assert!(looks_like_js("function check() { return true; }"));
        assert!(looks_like_js("window.done === true || (() => 1)()".trim()));
        assert!(!looks_like_js("div.content"));
        assert!(!looks_like_js("#main .item"));
    }
}
