//! Navigator-override init scripts.
//!
//! Injected with `Page.addScriptToEvaluateOnNewDocument` so they run before
//! any page script. Applied when the run config asks for navigator
//! overrides (directly, via simulate-user, or via magic mode).

use anyhow::Result;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use tracing::debug;

/// Hides the webdriver flag and fills in the properties headless Chrome
/// leaves empty.
const NAVIGATOR_OVERRIDES: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', {
    get: () => {
        const plugins = [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
            { name: 'Native Client', filename: 'internal-nacl-plugin' }
        ];
        Object.defineProperty(plugins, 'length', { value: plugins.length });
        return plugins;
    }
});
Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8 });
"#;

/// window.chrome exists on every real Chrome; headless omits it.
const CHROME_RUNTIME: &str = r#"
if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) {
    window.chrome.runtime = {
        connect: () => ({
            onMessage: { addListener: () => {}, removeListener: () => {} },
            postMessage: () => {}
        })
    };
}
"#;

/// The permissions API reports 'denied' for notifications in headless,
/// which is a known tell; report the default prompt state instead.
const PERMISSIONS_OVERRIDE: &str = r#"
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) =>
    parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters);
"#;

/// Mask the SwiftShader renderer headless exposes through WebGL.
const WEBGL_OVERRIDE: &str = r#"
if (window.WebGLRenderingContext) {
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function (param) {
        if (param === 37445) { return 'Intel Inc.'; }
        if (param === 37446) { return 'Intel Iris OpenGL Engine'; }
        return getParameter.apply(this, [param]);
    };
}
"#;

/// Install every override as an on-new-document script.
pub async fn inject(page: &Page) -> Result<()> {
    for (name, source) in [
        ("navigator_overrides", NAVIGATOR_OVERRIDES),
        ("chrome_runtime", CHROME_RUNTIME),
        ("permissions_override", PERMISSIONS_OVERRIDE),
        ("webgl_override", WEBGL_OVERRIDE),
    ] {
        page.execute(AddScriptToEvaluateOnNewDocumentParams {
            source: source.to_string(),
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        })
        .await?;
        debug!(script = name, "injected navigator override");
    }
    Ok(())
}
