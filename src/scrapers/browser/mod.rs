//! Headless-browser page fetcher.
//!
//! Comment threads on the watched site lazy-load collapsed replies, so a
//! plain HTTP fetch misses them. The browser fetcher renders the page in
//! Chrome (via chromiumoxide/CDP), clicks the reply toggles until nothing
//! new appears, and returns the rendered DOM.

mod config;
#[cfg(feature = "browser")]
mod render;

pub use config::BrowserEngineConfig;

use async_trait::async_trait;

use super::fetch::{FetchError, PageFetcher};

#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use anyhow::{Context, Result};
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info};

/// A running browser and the task driving its CDP connection.
#[cfg(feature = "browser")]
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Browser-based fetcher. The browser is launched on first use and reused
/// for every later fetch until [`PageFetcher::close`] is called.
#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
    session: Mutex<Option<BrowserSession>>,
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    pub fn new(config: BrowserEngineConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BrowserEngineConfig {
        &self.config
    }

    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(path) = which::which(cmd) {
                info!("Found Chrome in PATH: {}", path.display());
                return Ok(path);
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Install it, set fetch.browser.remote_url, \
             or switch to fetch.engine = \"http\""
        ))
    }

    async fn launch(&self) -> Result<BrowserSession> {
        if let Some(remote_url) = self.config.remote_url.as_deref() {
            return self.connect_remote(remote_url).await;
        }

        info!("Launching browser (headless={})", self.config.headless);
        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        Ok(BrowserSession {
            browser,
            handler: spawn_handler(handler),
        })
    }

    async fn connect_remote(&self, url: &str) -> Result<BrowserSession> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, self.config.timeout
        );

        // The DevTools websocket URL comes from /json/version
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.timeout),
            ..Default::default()
        };

        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")?;

        Ok(BrowserSession {
            browser,
            handler: spawn_handler(handler),
        })
    }

    /// Open a tab, launching the browser first if needed. The session lock
    /// is released before the tab is used.
    async fn open_tab(&self) -> Result<Tab> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            *session = Some(self.launch().await?);
        }
        let browser = &session
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("browser not initialized after launch"))?
            .browser;

        let page = browser.new_page("about:blank").await?;
        Ok(Tab { page, closed: false })
    }

    async fn fetch_rendered(&self, url: &str) -> Result<String> {
        let tab = tokio::time::timeout(self.config.step_timeout(), self.open_tab())
            .await
            .map_err(|_| {
                anyhow::anyhow!("Opening a browser tab timed out after {}s", self.config.timeout)
            })??;

        let result = tokio::time::timeout(
            self.config.render_budget(),
            render::render_page(&tab.page, url, &self.config),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "Rendering {} exceeded {}s",
                url,
                self.config.render_budget().as_secs()
            )
        })
        .and_then(|rendered| rendered);

        tab.close().await;
        result
    }
}

/// An open browser tab. Closed explicitly after a render, or from `Drop`
/// when the fetch is cancelled mid-render.
#[cfg(feature = "browser")]
struct Tab {
    page: Page,
    closed: bool,
}

#[cfg(feature = "browser")]
impl Tab {
    async fn close(mut self) {
        self.closed = true;
        if let Err(e) = self.page.clone().close().await {
            debug!("Failed to close tab: {}", e);
        }
    }
}

#[cfg(feature = "browser")]
impl Drop for Tab {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let page = self.page.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            debug!("Closing tab left open by a cancelled fetch");
            runtime.spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}

#[cfg(feature = "browser")]
fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_rendered(url)
            .await
            .map_err(|e| FetchError::Browser {
                url: url.to_string(),
                message: format!("{:#}", e),
            })
    }

    async fn close(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            if let Err(e) = session.browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            session.handler.abort();
            info!("Browser closed");
        }
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrowserEngineConfig {
        &self.config
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        Err(FetchError::Browser {
            url: url.to_string(),
            message: "Browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        })
    }
}
