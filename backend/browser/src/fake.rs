//! In-memory driver for tests and development.
//!
//! Pages behave like a static document: screenshots return whatever bytes
//! were staged with `set_png`, and the dirtiness flag mirrors the in-page
//! `__hb` tracker — `mark_dirty` plays the role of a DOM mutation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::driver::{BrowserDriver, BrowserHandle, LaunchOptions, Page};
use crate::scripts;

#[derive(Default)]
pub struct FakeDriver {
    launches: AtomicUsize,
    browsers: Mutex<Vec<Arc<FakeBrowser>>>,
    fail_launch: AtomicBool,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn browsers(&self) -> Vec<Arc<FakeBrowser>> {
        self.browsers.lock().unwrap().clone()
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// All pages across all launched browsers, in creation order.
    pub fn pages(&self) -> Vec<Arc<FakePage>> {
        self.browsers
            .lock()
            .unwrap()
            .iter()
            .flat_map(|b| b.pages())
            .collect()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(&self, _opts: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>> {
        if self.fail_launch.load(Ordering::SeqCst) {
            bail!("fake launch failure");
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        let browser = Arc::new(FakeBrowser::default());
        self.browsers.lock().unwrap().push(browser.clone());
        Ok(browser)
    }
}

#[derive(Default)]
pub struct FakeBrowser {
    closed: AtomicBool,
    pages: Mutex<Vec<Arc<FakePage>>>,
}

impl FakeBrowser {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> Vec<Arc<FakePage>> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_page(&self, init_scripts: &[String]) -> Result<Arc<dyn Page>> {
        if self.is_closed() {
            bail!("browser is closed");
        }
        let page = Arc::new(FakePage {
            init_script_count: init_scripts.len(),
            ..Default::default()
        });
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        for page in self.pages() {
            page.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePage {
    pub init_script_count: usize,
    url: Mutex<String>,
    dirty: AtomicBool,
    png: Mutex<Vec<u8>>,
    navigations: Mutex<Vec<String>>,
    reloads: AtomicUsize,
    screenshots: AtomicUsize,
    closed: AtomicBool,
    fail_navigation: AtomicBool,
    fail_screenshot: AtomicBool,
}

impl FakePage {
    pub fn set_png(&self, bytes: Vec<u8>) {
        *self.png.lock().unwrap() = bytes;
    }

    /// Simulate a DOM mutation observed by the in-page tracker.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn screenshots(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }

    pub fn set_fail_navigation(&self, fail: bool) {
        self.fail_navigation.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_screenshot(&self, fail: bool) {
        self.fail_screenshot.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        if self.fail_navigation.load(Ordering::SeqCst) {
            bail!("fake navigation failure");
        }
        self.navigations.lock().unwrap().push(url.to_string());
        *self.url.lock().unwrap() = url.to_string();
        // A fresh document starts dirty, exactly like the real init script.
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<()> {
        if self.fail_navigation.load(Ordering::SeqCst) {
            bail!("fake reload failure");
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        if script == scripts::CONSUME_DIRTY_SCRIPT {
            let was = self.dirty.swap(false, Ordering::SeqCst);
            return Ok(serde_json::Value::Bool(was));
        }
        if script == scripts::PAINT_DEBOUNCE_SCRIPT {
            return Ok(serde_json::Value::Bool(true));
        }
        if script == scripts::MARK_DIRTY_SCRIPT {
            self.dirty.store(true, Ordering::SeqCst);
            return Ok(serde_json::Value::Bool(true));
        }
        if script == scripts::SUPPRESS_TRANSIENTS_SCRIPT {
            return Ok(serde_json::Value::Bool(true));
        }
        Ok(serde_json::Value::Null)
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        if self.fail_screenshot.load(Ordering::SeqCst) {
            bail!("fake screenshot failure");
        }
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(self.png.lock().unwrap().clone())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consume_dirty_reads_and_clears() {
        let driver = FakeDriver::new();
        let browser = driver.launch(&LaunchOptions::new(384, 64)).await.unwrap();
        let page = browser
            .new_page(&scripts::page_init_scripts())
            .await
            .unwrap();

        page.goto("http://host/vis/index.html", Duration::from_secs(45))
            .await
            .unwrap();
        let first = page.evaluate(scripts::CONSUME_DIRTY_SCRIPT).await.unwrap();
        let second = page.evaluate(scripts::CONSUME_DIRTY_SCRIPT).await.unwrap();
        assert_eq!(first, serde_json::Value::Bool(true));
        assert_eq!(second, serde_json::Value::Bool(false));
    }
}
