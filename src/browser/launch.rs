//! Browser process launch: embedded via the driver, or managed by spawning
//! the binary ourselves and attaching over the debug protocol.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::BrowserConfig;

/// Environment variable overriding browser executable discovery.
pub const BROWSER_PATH_ENV: &str = "CRAWLMARK_BROWSER_PATH";

/// A launched or adopted browser plus its lifecycle tasks.
pub struct LaunchedBrowser {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    pub managed: Option<ManagedProcess>,
    /// Profile directory we created and must delete on shutdown.
    pub temp_profile: Option<PathBuf>,
}

impl std::fmt::Debug for LaunchedBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedBrowser")
            .field("managed", &self.managed.is_some())
            .field("temp_profile", &self.temp_profile)
            .finish()
    }
}

/// The spawned browser process in managed mode.
pub struct ManagedProcess {
    pub child: tokio::process::Child,
    pub supervisor: JoinHandle<()>,
    /// Set before an intentional shutdown so the supervisor stays quiet.
    pub shutting_down: Arc<AtomicBool>,
}

/// Find a Chrome/Chromium executable: env override, well-known paths, PATH.
pub fn find_browser_executable(config: &BrowserConfig) -> Result<PathBuf> {
    if let Ok(path) = std::env::var(BROWSER_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            info!(path = %path.display(), "using browser from {BROWSER_PATH_ENV}");
            return Ok(path);
        }
        warn!(path = %path.display(), "{BROWSER_PATH_ENV} points to a missing file");
    }

    let candidates: Vec<PathBuf> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".into(),
            "/Applications/Chromium.app/Contents/MacOS/Chromium".into(),
            "/opt/homebrew/bin/chromium".into(),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe".into(),
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe".into(),
        ]
    } else {
        vec![
            "/usr/bin/google-chrome".into(),
            "/usr/bin/google-chrome-stable".into(),
            "/usr/bin/chromium".into(),
            "/usr/bin/chromium-browser".into(),
            "/snap/bin/chromium".into(),
            "/opt/google/chrome/chrome".into(),
        ]
    };
    for path in candidates {
        if path.exists() {
            info!(path = %path.display(), "found browser executable");
            return Ok(path);
        }
    }

    // `channel` lets the caller name a specific binary on PATH.
    let mut names = vec![
        config.browser_kind().executable_hint(),
        "chromium",
        "chromium-browser",
        "google-chrome",
    ];
    if let Some(channel) = config_channel(config) {
        names.insert(0, channel);
    }
    if !cfg!(target_os = "windows") {
        for name in names {
            if let Ok(output) = std::process::Command::new("which").arg(name).output()
                && output.status.success()
            {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(anyhow!("no Chrome/Chromium executable found"))
}

fn config_channel(config: &BrowserConfig) -> Option<&str> {
    (config.browser_kind() == crate::config::BrowserKind::Chromium)
        .then(|| config.channel_name())
        .flatten()
}

/// Curated launch arguments shared by both modes.
fn browser_args(config: &BrowserConfig) -> Vec<String> {
    let (width, height) = config.viewport();
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-dev-shm-usage".to_string(),
        format!("--window-size={width},{height}"),
    ];
    if config.ignore_https_errors() {
        args.push("--ignore-certificate-errors".to_string());
    }
    if config.text_mode() {
        args.push("--blink-settings=imagesEnabled=false".to_string());
        args.push("--disable-gpu".to_string());
        args.push("--disable-remote-fonts".to_string());
    }
    if config.text_mode() && !config.java_script_enabled() {
        args.push("--disable-javascript".to_string());
    }
    if config.light_mode() {
        args.push("--disable-background-networking".to_string());
        args.push("--disable-background-timer-throttling".to_string());
        args.push("--disable-backgrounding-occluded-windows".to_string());
        args.push("--disable-breakpad".to_string());
        args.push("--disable-hang-monitor".to_string());
        args.push("--metrics-recording-only".to_string());
        args.push("--mute-audio".to_string());
    }
    if let Some(proxy) = config.proxy() {
        args.push(format!("--proxy-server={}", proxy.server));
    }
    args.extend(config.extra_args_list().iter().cloned());
    args
}

/// Launch through the driver (embedded mode).
pub async fn launch_embedded(config: &BrowserConfig) -> Result<LaunchedBrowser> {
    let executable = find_browser_executable(config)?;

    let (user_data_dir, temp_profile) = match config.user_data_dir_path() {
        Some(dir) => (dir.clone(), None),
        None => {
            let dir = tempfile::Builder::new()
                .prefix("crawlmark_profile_")
                .tempdir()
                .context("failed to create browser profile dir")?
                .keep();
            (dir.clone(), Some(dir))
        }
    };
    std::fs::create_dir_all(&user_data_dir).context("failed to create user data dir")?;

    let (width, height) = config.viewport();
    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(width, height)
        .user_data_dir(&user_data_dir)
        .chrome_executable(executable);

    builder = if config.headless() {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };
    for arg in browser_args(config) {
        builder = builder.arg(arg);
    }

    let browser_config = builder
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

    info!("launching embedded browser");
    let (browser, handler) = Browser::launch(browser_config)
        .await
        .context("failed to launch browser")?;
    let handler_task = spawn_handler_task(handler);

    Ok(LaunchedBrowser {
        browser,
        handler_task,
        managed: None,
        temp_profile,
    })
}

/// Spawn the binary with a debug port and attach (managed mode).
pub async fn launch_managed(config: &BrowserConfig) -> Result<LaunchedBrowser> {
    let executable = find_browser_executable(config)?;
    let port = config.debugging_port();

    let (user_data_dir, temp_profile) = match config.user_data_dir_path() {
        Some(dir) => (dir.clone(), None),
        None => {
            let dir = tempfile::Builder::new()
                .prefix("crawlmark_managed_")
                .tempdir()
                .context("failed to create managed profile dir")?
                .keep();
            (dir.clone(), Some(dir))
        }
    };
    std::fs::create_dir_all(&user_data_dir).context("failed to create user data dir")?;

    let mut command = tokio::process::Command::new(&executable);
    command
        .arg(format!("--remote-debugging-port={port}"))
        .arg(format!("--user-data-dir={}", user_data_dir.display()))
        .args(browser_args(config))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if config.headless() {
        command.arg("--headless=new");
    }

    info!(port, executable = %executable.display(), "spawning managed browser");
    let mut child = command.spawn().context("failed to spawn managed browser")?;

    // Drain stdout at trace level; keep recent stderr for crash reports.
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(target: "crawlmark::managed_browser", "{line}");
            }
        });
    }
    let stderr_tail: Arc<std::sync::Mutex<Vec<String>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    if let Some(stderr) = child.stderr.take() {
        let tail = Arc::clone(&stderr_tail);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(target: "crawlmark::managed_browser", "{line}");
                if let Ok(mut buffer) = tail.lock() {
                    buffer.push(line);
                    let len = buffer.len();
                    if len > 50 {
                        buffer.drain(..len - 50);
                    }
                }
            }
        });
    }

    let ws_url = resolve_debugger_url(port).await?;
    let (browser, handler) = Browser::connect(ws_url)
        .await
        .context("failed to connect to managed browser")?;
    let handler_task = spawn_handler_task(handler);

    // Supervisor: a death outside shutdown is a crash worth reporting.
    let shutting_down = Arc::new(AtomicBool::new(false));
    let supervisor = {
        let shutting_down = Arc::clone(&shutting_down);
        let stderr_tail = Arc::clone(&stderr_tail);
        let pid = child.id();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if shutting_down.load(Ordering::Relaxed) {
                    break;
                }
                let alive = pid.is_some_and(process_alive);
                if !alive {
                    let tail = stderr_tail
                        .lock()
                        .map(|b| b.join("\n"))
                        .unwrap_or_default();
                    error!(
                        "managed browser process died unexpectedly; recent stderr:\n{tail}"
                    );
                    break;
                }
            }
        })
    };

    Ok(LaunchedBrowser {
        browser,
        handler_task,
        managed: Some(ManagedProcess {
            child,
            supervisor,
            shutting_down,
        }),
        temp_profile,
    })
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
        || std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Ask the DevTools HTTP endpoint for the browser WebSocket URL, retrying
/// while the process boots.
async fn resolve_debugger_url(port: u16) -> Result<String> {
    let endpoint = format!("http://127.0.0.1:{port}/json/version");
    let client = reqwest::Client::new();
    for attempt in 0..50 {
        match client.get(&endpoint).send().await {
            Ok(response) => {
                let value: serde_json::Value = response
                    .json()
                    .await
                    .context("invalid /json/version response")?;
                if let Some(ws) = value.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    debug!(ws, "resolved debugger websocket url");
                    return Ok(ws.to_string());
                }
            }
            Err(e) => {
                trace!(attempt, error = %e, "debug endpoint not ready");
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    Err(anyhow!(
        "managed browser never exposed {endpoint} (10s timeout)"
    ))
}

/// Drive the CDP event loop, filtering the serialization errors Chrome
/// triggers for events chromiumoxide does not model.
fn spawn_handler_task(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                let benign = message.contains("data did not match any variant")
                    || message.contains("Failed to deserialize WS response");
                if benign {
                    trace!("suppressed benign CDP serialization error: {message}");
                } else {
                    error!("browser handler error: {message}");
                }
            }
        }
        debug!("browser handler task finished");
    })
}
