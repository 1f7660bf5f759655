//! Chromium-backed driver speaking CDP via `chromiumoxide`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, HeaderEntry, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, ReloadParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page as CdpPage, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::{BrowserDriver, BrowserHandle, LaunchOptions, Page};
use crate::scripts;

/// Driver backed by a locally launched headless Chromium.
#[derive(Debug, Default)]
pub struct ChromiumDriver;

impl ChromiumDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(&self, opts: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>> {
        let mut builder = BrowserConfig::builder().viewport(Viewport {
            width: opts.width,
            height: opts.height,
            device_scale_factor: Some(1.0),
            ..Default::default()
        });
        for arg in &opts.args {
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(anyhow::Error::msg)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launching headless chromium")?;

        // The handler stream must be polled for the CDP connection to make
        // progress.
        let event_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler event error");
                }
            }
        });

        Ok(Arc::new(ChromiumBrowser {
            browser: Mutex::new(browser),
            event_task,
            no_cache_url_globs: opts.no_cache_url_globs.clone(),
        }))
    }
}

struct ChromiumBrowser {
    browser: Mutex<Browser>,
    event_task: JoinHandle<()>,
    no_cache_url_globs: Vec<String>,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_page(&self, init_scripts: &[String]) -> Result<Arc<dyn Page>> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .context("opening page")?
        };

        for script in init_scripts {
            let params = AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(script.clone())
                .build()
                .map_err(anyhow::Error::msg)?;
            page.execute(params)
                .await
                .context("installing init script")?;
        }

        install_no_cache_interception(&page, &self.no_cache_url_globs).await?;

        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("closing browser")?;
        let _ = browser.wait().await;
        self.event_task.abort();
        Ok(())
    }
}

/// Intercept requests matching the configured globs and forward them with
/// no-cache headers, so the dashboard server re-serves `vis-views.json` and
/// `vis-user.css` instead of a stale cached copy.
async fn install_no_cache_interception(page: &CdpPage, globs: &[String]) -> Result<()> {
    if globs.is_empty() {
        return Ok(());
    }

    let patterns: Vec<RequestPattern> = globs
        .iter()
        .map(|glob| {
            RequestPattern::builder()
                .url_pattern(glob.clone())
                .request_stage(RequestStage::Request)
                .build()
        })
        .collect();
    page.execute(fetch::EnableParams {
        patterns: Some(patterns),
        handle_auth_requests: None,
    })
    .await
    .context("enabling request interception")?;

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .context("listening for intercepted requests")?;
    let page = page.clone();
    tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let mut headers: Vec<HeaderEntry> = Vec::new();
            if let Ok(serde_json::Value::Object(existing)) =
                serde_json::to_value(&event.request.headers)
            {
                for (name, value) in existing {
                    if let Some(value) = value.as_str() {
                        if name.eq_ignore_ascii_case("cache-control")
                            || name.eq_ignore_ascii_case("pragma")
                        {
                            continue;
                        }
                        headers.push(HeaderEntry {
                            name,
                            value: value.to_string(),
                        });
                    }
                }
            }
            headers.push(HeaderEntry {
                name: "cache-control".to_string(),
                value: "no-cache".to_string(),
            });
            headers.push(HeaderEntry {
                name: "pragma".to_string(),
                value: "no-cache".to_string(),
            });

            let params = ContinueRequestParams::builder()
                .request_id(event.request_id.clone())
                .headers(headers)
                .build();
            match params {
                Ok(params) => {
                    if let Err(err) = page.execute(params).await {
                        warn!(error = %err, "failed to continue intercepted request");
                    }
                }
                Err(err) => warn!(error = %err, "failed to build continue-request params"),
            }
        }
    });

    Ok(())
}

struct ChromiumPage {
    page: CdpPage,
}

#[async_trait]
impl Page for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let navigation = async {
            self.page.goto(url.to_string()).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, anyhow::Error>(())
        };
        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| anyhow::anyhow!("navigation to {url} timed out"))??;
        Ok(())
    }

    async fn reload(&self, timeout: Duration) -> Result<()> {
        let reload = async {
            self.page.execute(ReloadParams::default()).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, anyhow::Error>(())
        };
        tokio::time::timeout(timeout, reload)
            .await
            .map_err(|_| anyhow::anyhow!("reload timed out"))??;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script.to_string()).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        // Freeze CSS animations/transitions and hide the caret before
        // capturing. Pages that reject the injection (e.g. strict CSP) fall
        // back to a plain capture.
        if let Err(err) = self
            .page
            .evaluate(scripts::SUPPRESS_TRANSIENTS_SCRIPT.to_string())
            .await
        {
            debug!(error = %err, "transient suppression rejected; capturing as-is");
        }
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await?;
        Ok(())
    }
}
