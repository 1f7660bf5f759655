//! Headless browser driver capability.
//!
//! The renderer drives the browser exclusively through these traits: launch a
//! browser, open pages with init scripts installed, navigate, evaluate
//! in-page script, screenshot. The production implementation speaks CDP via
//! `chromiumoxide`; tests use the in-memory `fake` driver.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Options for launching the shared headless browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Page viewport, pixel ratio 1.
    pub width: u32,
    pub height: u32,
    /// Extra browser CLI switches.
    pub args: Vec<String>,
    /// URL glob patterns whose requests must carry no-cache headers.
    pub no_cache_url_globs: Vec<String>,
}

impl LaunchOptions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            args: vec![
                "--disable-dev-shm-usage".to_string(),
                // Defeats the dashboard's legacy offline-manifest cache.
                "--disable-application-cache".to_string(),
            ],
            no_cache_url_globs: vec![
                "*/vis.0/*/vis-views.json*".to_string(),
                "*/vis.0/*/vis-user.css*".to_string(),
            ],
        }
    }
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Launch a headless browser instance.
    async fn launch(&self, opts: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>>;
}

#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Open a new page with the given init scripts installed to run on every
    /// document load.
    async fn new_page(&self, init_scripts: &[String]) -> Result<Arc<dyn Page>>;

    /// Close the browser and release the underlying process.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate with DOM-content-loaded semantics, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Reload the current document, bounded by `timeout`.
    async fn reload(&self, timeout: Duration) -> Result<()>;

    /// The page's current URL.
    async fn current_url(&self) -> Result<String>;

    /// Run a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Capture the viewport as PNG bytes.
    async fn screenshot_png(&self) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}
