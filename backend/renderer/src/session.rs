//! View sessions: one page and one capture loop per view.
//!
//! A session outlives its page: the lightweight state (view config,
//! subscriber count, timestamps, last frame) persists while the page and even
//! the browser are torn down for inactivity, and the next activation revives
//! it transparently.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use hudbridge_browser::driver::{BrowserHandle, Page};
use hudbridge_browser::scripts;
use hudbridge_core::{keys, now_ms, Frame, SessionStatus, StateSink, ViewConfig};

use crate::cache_bust::{cache_busted_url, strip_cache_bust};
use crate::FrameEvent;

/// Sleep between no-op loop iterations.
const QUIET_SLEEP_MS: u64 = 200;
/// Sleep after a failed iteration before retrying.
const ERROR_SLEEP_MS: u64 = 1000;
/// Captures within this window after a change are paced to the session's
/// minimum interval. Tuned for LED-matrix rendering; do not remove.
const BURST_WINDOW_MS: i64 = 2000;
/// Navigation and reload budget.
const NAV_TIMEOUT: Duration = Duration::from_secs(45);

/// Pool-level knobs a session needs, fixed at pool construction.
#[derive(Debug, Clone)]
pub struct SessionTuning {
    pub capture_max_interval_ms: u64,
    pub auto_reload_ms: u64,
    pub cache_bust_on_reload: bool,
}

impl SessionTuning {
    /// The per-view capture floor: `busy_fps` overrides the global minimum.
    fn min_interval_for(&self, view: &ViewConfig) -> u64 {
        view.capture_min_interval_ms()
    }
}

struct SessionState {
    view: ViewConfig,
    page: Option<Arc<dyn Page>>,
    subscribers: usize,
    last_http_seen_ts: i64,
    last_inactive_ts: i64,
    want_capture_now: bool,
    want_reload_now: bool,
    enabled: bool,
    running: bool,
    probe_ms: u64,
    min_interval_ms: u64,
    max_interval_ms: u64,
    last_reload_ts: i64,
    last_capture_ts: i64,
    last_change_ts: i64,
    last_error: Option<String>,
    last_frame: Option<Frame>,
}

impl SessionState {
    /// Millis reference for inactivity decisions.
    fn idle_since(&self) -> i64 {
        self.last_http_seen_ts.max(self.last_inactive_ts)
    }
}

enum CaptureOutcome {
    Idle,
    Throttled(u64),
    Captured,
}

pub struct ViewSession {
    state: Mutex<SessionState>,
    wake: Notify,
    events: UnboundedSender<FrameEvent>,
    tuning: SessionTuning,
    state_sink: Arc<dyn StateSink>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl ViewSession {
    pub(crate) fn spawn(
        view: ViewConfig,
        tuning: SessionTuning,
        events: UnboundedSender<FrameEvent>,
        state_sink: Arc<dyn StateSink>,
    ) -> Arc<Self> {
        let min_interval_ms = tuning.min_interval_for(&view);
        let max_interval_ms = tuning.capture_max_interval_ms.max(min_interval_ms);
        let session = Arc::new(Self {
            state: Mutex::new(SessionState {
                view,
                page: None,
                subscribers: 0,
                last_http_seen_ts: 0,
                last_inactive_ts: 0,
                want_capture_now: false,
                want_reload_now: false,
                enabled: false,
                running: false,
                probe_ms: min_interval_ms,
                min_interval_ms,
                max_interval_ms,
                last_reload_ts: 0,
                last_capture_ts: 0,
                last_change_ts: 0,
                last_error: None,
                last_frame: None,
            }),
            wake: Notify::new(),
            events,
            tuning,
            state_sink,
            loop_task: Mutex::new(None),
        });
        session.ensure_loop();
        session
    }

    pub fn view(&self) -> ViewConfig {
        self.state.lock().unwrap().view.clone()
    }

    pub fn view_id(&self) -> String {
        self.state.lock().unwrap().view.id.clone()
    }

    pub fn subscribers(&self) -> usize {
        self.state.lock().unwrap().subscribers
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.state.lock().unwrap().last_frame.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    pub fn page_open(&self) -> bool {
        self.state.lock().unwrap().page.is_some()
    }

    pub fn probe_ms(&self) -> u64 {
        self.state.lock().unwrap().probe_ms
    }

    pub fn last_reload_ts(&self) -> i64 {
        self.state.lock().unwrap().last_reload_ts
    }

    /// A view is wanted while it has subscribers or saw HTTP/subscriber
    /// activity within the grace window.
    pub fn wanted(&self, now: i64, grace_ms: u64) -> bool {
        let st = self.state.lock().unwrap();
        st.subscribers > 0 || now - st.idle_since() <= grace_ms as i64
    }

    pub fn status(&self) -> SessionStatus {
        let st = self.state.lock().unwrap();
        SessionStatus {
            view_id: st.view.id.clone(),
            page_open: st.page.is_some(),
            subscribers: st.subscribers,
            probe_ms: st.probe_ms,
            last_capture_ts: st.last_capture_ts,
            last_reload_ts: st.last_reload_ts,
            last_error: st.last_error.clone(),
            has_frame: st.last_frame.is_some(),
        }
    }

    pub(crate) fn subscribe(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.subscribers += 1;
            st.last_inactive_ts = 0;
            st.want_capture_now = true;
            st.enabled = true;
        }
        self.wake.notify_waiters();
    }

    /// Returns the remaining subscriber count.
    pub(crate) fn unsubscribe(&self) -> usize {
        let mut st = self.state.lock().unwrap();
        st.subscribers = st.subscribers.saturating_sub(1);
        if st.subscribers == 0 {
            st.last_inactive_ts = now_ms();
        }
        st.subscribers
    }

    pub(crate) fn touch_http(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.last_http_seen_ts = now_ms();
            st.last_inactive_ts = 0;
            st.want_capture_now = true;
            st.enabled = true;
        }
        self.wake.notify_waiters();
    }

    /// One-shot: capture on the next loop iteration regardless of dirtiness.
    pub fn request_capture_now(&self) {
        self.state.lock().unwrap().want_capture_now = true;
        self.wake.notify_waiters();
    }

    /// One-shot: reload the page on the next loop iteration.
    pub fn request_reload_now(&self) {
        self.state.lock().unwrap().want_reload_now = true;
        self.wake.notify_waiters();
    }

    /// Replace the view configuration. Rebinds the capture floor when
    /// `busy_fps` changed and navigates an open page whose URL differs.
    pub(crate) async fn set_view(&self, view: ViewConfig) {
        let url = view.url.clone();
        let (page, url_changed) = {
            let mut st = self.state.lock().unwrap();
            if st.view.busy_fps != view.busy_fps {
                st.min_interval_ms = self.tuning.min_interval_for(&view);
                st.max_interval_ms = self
                    .tuning
                    .capture_max_interval_ms
                    .max(st.min_interval_ms);
            }
            let url_changed = st.view.url != view.url;
            st.view = view;
            st.want_capture_now = true;
            st.probe_ms = st.min_interval_ms;
            (st.page.clone(), url_changed)
        };
        if url_changed {
            if let Some(page) = page {
                if let Err(err) = page.goto(&url, NAV_TIMEOUT).await {
                    self.record_error(format!("{err:#}"));
                }
            }
        }
        self.wake.notify_waiters();
    }

    /// Activation gating, run on every maintenance pass and synchronously
    /// after subscribe/touch to cut the cold-start latency.
    pub(crate) async fn tick(
        &self,
        browser: Option<&Arc<dyn BrowserHandle>>,
        now: i64,
        grace_ms: u64,
        close_page_after_ms: u64,
    ) {
        if !self.wanted(now, grace_ms) {
            let idle_page = {
                let mut st = self.state.lock().unwrap();
                let expired =
                    st.page.is_some() && now - st.idle_since() > close_page_after_ms as i64;
                if expired {
                    st.page.take()
                } else {
                    None
                }
            };
            if let Some(page) = idle_page {
                debug!(view = %self.view_id(), "closing idle page");
                let _ = page.close().await;
            }
            return;
        }

        let (page, view_url) = {
            let st = self.state.lock().unwrap();
            (st.page.clone(), st.view.url.clone())
        };
        match page {
            None => {
                let Some(browser) = browser else { return };
                let result = async {
                    let page = browser.new_page(&scripts::page_init_scripts()).await?;
                    page.goto(&view_url, NAV_TIMEOUT).await?;
                    Ok::<_, anyhow::Error>(page)
                }
                .await;
                match result {
                    Ok(page) => {
                        let leftover = {
                            let mut st = self.state.lock().unwrap();
                            if st.page.is_none() {
                                st.page = Some(page);
                                st.want_capture_now = true;
                                None
                            } else {
                                // Another activation won the race; drop ours.
                                Some(page)
                            }
                        };
                        if let Some(extra) = leftover {
                            let _ = extra.close().await;
                        }
                        self.wake.notify_waiters();
                    }
                    Err(err) => {
                        let msg = format!("{err:#}");
                        warn!(view = %self.view_id(), error = %msg, "failed to open page");
                        self.record_error(msg);
                    }
                }
            }
            Some(page) => {
                let current = page.current_url().await.unwrap_or_default();
                if current != view_url && strip_cache_bust(&current) != view_url {
                    if let Err(err) = page.goto(&view_url, NAV_TIMEOUT).await {
                        let msg = format!("{err:#}");
                        warn!(view = %self.view_id(), error = %msg, "navigation failed");
                        self.record_error(msg);
                    }
                }
            }
        }
    }

    /// Drop the page reference without closing it; used when the browser
    /// underneath has already gone away.
    pub(crate) fn invalidate_page(&self) {
        self.state.lock().unwrap().page = None;
    }

    /// (Re)start the capture loop if it is not running.
    pub(crate) fn ensure_loop(self: &Arc<Self>) {
        let mut task = self.loop_task.lock().unwrap();
        let needs_start = task.as_ref().map(JoinHandle::is_finished).unwrap_or(true);
        if needs_start {
            self.state.lock().unwrap().running = true;
            let session = self.clone();
            *task = Some(tokio::spawn(session.run_loop()));
        }
    }

    /// Stop the capture loop and wait for it to exit. The page stays open.
    pub(crate) async fn stop_loop(&self) {
        let handle = {
            self.state.lock().unwrap().running = false;
            self.wake.notify_waiters();
            self.loop_task.lock().unwrap().take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Full shutdown: stop the loop, then close the page.
    pub(crate) async fn stop(&self) {
        self.stop_loop().await;
        let page = self.state.lock().unwrap().page.take();
        if let Some(page) = page {
            let _ = page.close().await;
        }
    }

    fn record_error(&self, message: String) {
        self.state.lock().unwrap().last_error = Some(message.clone());
        self.state_sink
            .set_state(keys::INFO_LAST_ERROR, json!(message));
    }

    /// Sleep, interruptible by any flag change or stop request.
    async fn idle(&self, ms: u64) {
        tokio::select! {
            _ = self.wake.notified() => {}
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
        }
    }

    async fn run_loop(self: Arc<Self>) {
        debug!(view = %self.view_id(), "capture loop started");
        loop {
            let (running, enabled, page) = {
                let st = self.state.lock().unwrap();
                (st.running, st.enabled, st.page.clone())
            };
            if !running {
                break;
            }
            let Some(page) = page else {
                self.idle(QUIET_SLEEP_MS).await;
                continue;
            };
            if !enabled {
                self.idle(QUIET_SLEEP_MS).await;
                continue;
            }

            let now = now_ms();
            let reload_due = {
                let mut st = self.state.lock().unwrap();
                let due = st.want_reload_now
                    || (self.tuning.auto_reload_ms > 0
                        && now - st.last_reload_ts >= self.tuning.auto_reload_ms as i64);
                if due {
                    st.want_reload_now = false;
                }
                due
            };
            if reload_due {
                self.perform_reload(&page, now).await;
                self.idle(QUIET_SLEEP_MS).await;
                continue;
            }

            match self.capture_iteration(&page, now).await {
                Ok(CaptureOutcome::Idle) => self.idle(QUIET_SLEEP_MS).await,
                Ok(CaptureOutcome::Throttled(ms)) => self.idle(ms).await,
                Ok(CaptureOutcome::Captured) => {}
                Err(err) => {
                    let msg = format!("{err:#}");
                    warn!(view = %self.view_id(), error = %msg, "capture iteration failed");
                    self.record_error(msg);
                    self.idle(ERROR_SLEEP_MS).await;
                }
            }
        }
        debug!(view = %self.view_id(), "capture loop exited");
    }

    async fn capture_iteration(
        &self,
        page: &Arc<dyn Page>,
        now: i64,
    ) -> Result<CaptureOutcome> {
        let mut capture = {
            let mut st = self.state.lock().unwrap();
            let forced = st.want_capture_now;
            st.want_capture_now = false;
            forced
        };

        if !capture {
            let dirty = page
                .evaluate(scripts::CONSUME_DIRTY_SCRIPT)
                .await?
                .as_bool()
                .unwrap_or(false);
            let mut st = self.state.lock().unwrap();
            if dirty {
                st.last_change_ts = now;
                st.probe_ms = st.min_interval_ms;
                capture = true;
            } else if now - st.last_capture_ts >= st.probe_ms as i64 {
                // Silent probe: pick up pixel changes the DOM observer cannot
                // see, e.g. canvas animations.
                capture = true;
            }
        }
        if !capture {
            return Ok(CaptureOutcome::Idle);
        }

        {
            let st = self.state.lock().unwrap();
            if now - st.last_change_ts <= BURST_WINDOW_MS
                && now - st.last_capture_ts < st.min_interval_ms as i64
            {
                return Ok(CaptureOutcome::Throttled(st.min_interval_ms));
            }
        }

        // Let two animation frames settle so transient DOM states are not
        // captured.
        page.evaluate(scripts::PAINT_DEBOUNCE_SCRIPT).await?;
        let png = page.screenshot_png().await?;
        self.publish(png);
        Ok(CaptureOutcome::Captured)
    }

    fn publish(&self, png: Vec<u8>) {
        let ts = now_ms();
        let frame = Frame::new(png, ts);
        let event = {
            let mut st = self.state.lock().unwrap();
            st.last_capture_ts = ts;
            let changed = st
                .last_frame
                .as_ref()
                .map(|last| last.etag != frame.etag)
                .unwrap_or(true);
            if changed {
                st.probe_ms = st.min_interval_ms;
                st.last_change_ts = ts;
                st.last_frame = Some(frame.clone());
                st.last_error = None;
                Some(FrameEvent {
                    view_id: st.view.id.clone(),
                    frame,
                })
            } else {
                // Unchanged pixels: back off the silent probe.
                st.probe_ms = (st.probe_ms + st.probe_ms / 2).min(st.max_interval_ms);
                None
            }
        };
        if let Some(event) = event {
            // A successful publish supersedes any earlier pipeline error.
            self.state_sink.set_state(keys::INFO_LAST_ERROR, json!(""));
            let _ = self.events.send(event);
        }
    }

    async fn perform_reload(&self, page: &Arc<dyn Page>, now: i64) {
        let url = {
            let st = self.state.lock().unwrap();
            st.view.url.clone()
        };
        let target = cache_busted_url(&url, now, self.tuning.cache_bust_on_reload);

        let result = async {
            let current = page.current_url().await.unwrap_or_default();
            if current != target {
                page.goto(&target, NAV_TIMEOUT).await?;
            } else {
                page.reload(NAV_TIMEOUT).await?;
            }
            page.evaluate(scripts::MARK_DIRTY_SCRIPT).await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        if let Err(err) = result {
            let msg = format!("{err:#}");
            warn!(view = %self.view_id(), error = %msg, "reload failed");
            self.record_error(msg);
        }

        let mut st = self.state.lock().unwrap();
        st.last_reload_ts = now_ms();
        st.want_capture_now = true;
        st.probe_ms = st.min_interval_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hudbridge_browser::fake::FakePage;
    use hudbridge_core::MemoryStateSink;
    use tokio::sync::mpsc;

    fn view(id: &str, busy_fps: u32) -> ViewConfig {
        ViewConfig {
            id: id.to_string(),
            url: format!("http://host/vis/widgets.html#{id}"),
            name: None,
            enabled: true,
            busy_fps,
        }
    }

    fn tuning(max_ms: u64) -> SessionTuning {
        SessionTuning {
            capture_max_interval_ms: max_ms,
            auto_reload_ms: 0,
            cache_bust_on_reload: false,
        }
    }

    async fn session_with_page(
        view: ViewConfig,
        tuning: SessionTuning,
    ) -> (
        Arc<ViewSession>,
        Arc<FakePage>,
        mpsc::UnboundedReceiver<FrameEvent>,
        Arc<MemoryStateSink>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(MemoryStateSink::new());
        let session = ViewSession::spawn(view, tuning, tx, sink.clone());
        let page = Arc::new(FakePage::default());
        page.set_png(vec![1]);
        session.state.lock().unwrap().page = Some(page.clone());
        session.subscribe();
        (session, page, rx, sink)
    }

    async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        check()
    }

    #[tokio::test]
    async fn forced_capture_publishes_first_frame() {
        let (session, _page, mut rx, _sink) = session_with_page(view("a", 10), tuning(2000)).await;
        let event = tokio::time::timeout(Duration::from_millis(900), rx.recv())
            .await
            .expect("frame within cold-start budget")
            .expect("event");
        assert_eq!(event.view_id, "a");
        assert_eq!(event.frame.etag.len(), 42);
        assert!(session.last_frame().is_some());
        session.stop().await;
    }

    #[tokio::test]
    async fn identical_screenshots_do_not_republish() {
        let (session, page, mut rx, _sink) = session_with_page(view("a", 10), tuning(2000)).await;
        rx.recv().await.expect("first frame");

        // Same pixels, new mutation: capture happens, nothing is published.
        page.mark_dirty();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());

        // New pixels publish a second frame with a different etag.
        page.set_png(vec![2]);
        page.mark_dirty();
        let event = tokio::time::timeout(Duration::from_millis(1500), rx.recv())
            .await
            .expect("second frame")
            .expect("event");
        assert_eq!(event.frame.etag, hudbridge_core::quoted_sha1(&[2]));
        session.stop().await;
    }

    #[tokio::test]
    async fn probe_interval_backs_off_and_stays_bounded() {
        let (session, page, mut rx, _sink) = session_with_page(view("a", 10), tuning(400)).await;
        rx.recv().await.expect("first frame");

        // Silent probes on unchanged pixels walk 100 → 150 → 225 → 337 → 400.
        assert!(
            wait_until(3000, || session.probe_ms() == 400).await,
            "probe should back off to the max interval"
        );
        let min = session.state.lock().unwrap().min_interval_ms;
        assert_eq!(min, 100);

        // A visible change resets the probe to the floor.
        page.set_png(vec![3]);
        page.mark_dirty();
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("change frame")
            .expect("event");
        assert_eq!(event.frame.etag, hudbridge_core::quoted_sha1(&[3]));
        let probe = session.probe_ms();
        assert!((min..400).contains(&probe), "probe {probe} reset toward floor");
        session.stop().await;
    }

    #[tokio::test]
    async fn screenshot_failure_is_absorbed() {
        let (session, page, mut rx, sink) = session_with_page(view("a", 10), tuning(2000)).await;
        rx.recv().await.expect("first frame");

        page.set_fail_screenshot(true);
        page.mark_dirty();
        assert!(wait_until(2000, || session.last_error().is_some()).await);
        // The failure is surfaced to the host state keys as well.
        let reported = sink.get(keys::INFO_LAST_ERROR).and_then(|v| v.as_str().map(String::from));
        assert!(reported.is_some_and(|msg| !msg.is_empty()));

        // The loop keeps running and recovers once the driver does.
        page.set_fail_screenshot(false);
        page.set_png(vec![9]);
        page.mark_dirty();
        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("recovered frame")
            .expect("event");
        assert_eq!(event.frame.etag, hudbridge_core::quoted_sha1(&[9]));
        // A successful publish clears the reported error again.
        assert_eq!(sink.get(keys::INFO_LAST_ERROR), Some(json!("")));
        session.stop().await;
    }

    #[tokio::test]
    async fn auto_reload_fires_and_forces_capture() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = ViewSession::spawn(
            view("a", 10),
            SessionTuning {
                capture_max_interval_ms: 2000,
                auto_reload_ms: 100,
                cache_bust_on_reload: false,
            },
            tx,
            Arc::new(MemoryStateSink::new()),
        );
        let page = Arc::new(FakePage::default());
        page.set_png(vec![1]);
        page.goto("http://host/vis/widgets.html#a", NAV_TIMEOUT)
            .await
            .unwrap();
        session.state.lock().unwrap().page = Some(page.clone());
        session.subscribe();
        rx.recv().await.expect("first frame");

        let first_reload_ts = session.last_reload_ts();
        assert!(
            wait_until(2000, || page.reloads() >= 2).await,
            "auto reload should fire repeatedly"
        );
        assert!(session.last_reload_ts() > first_reload_ts);
        // Reloads force captures even without DOM mutations in between.
        let captures = page.screenshots();
        assert!(wait_until(1000, || page.screenshots() > captures).await);
        session.stop().await;
    }

    #[tokio::test]
    async fn stop_closes_page_and_joins_loop() {
        let (session, page, mut rx, _sink) = session_with_page(view("a", 10), tuning(2000)).await;
        rx.recv().await.expect("first frame");
        session.stop().await;
        assert!(page.is_closed());
        assert!(!session.page_open());
    }
}
