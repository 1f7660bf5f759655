//! The multi-view rendering pool.
//!
//! Owns the single headless browser, creates per-view sessions lazily, and
//! enforces the active-view cap with short-lived reservations so parallel
//! request bursts cannot overshoot it. A 1 Hz maintenance pass drives the
//! idle teardown ladder: page after `close_page_after_inactive_ms`, browser
//! after `close_browser_after_inactive_ms`, sessions persisting as
//! lightweight state throughout.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use hudbridge_browser::driver::{BrowserDriver, BrowserHandle, LaunchOptions};
use hudbridge_config::Settings;
use hudbridge_core::{keys, now_ms, Frame, HudError, PoolStatus, StateSink, ViewConfig};

use crate::session::{SessionTuning, ViewSession};
use crate::subscribers::SubscriptionRegistry;
use crate::waiters::FrameWaiters;
use crate::FrameEvent;

/// How long a reservation counts against the active-view cap.
const RESERVATION_TTL_MS: i64 = 5000;

/// Hard bounds on the configured cap.
const MIN_ACTIVE_VIEWS: usize = 1;
const MAX_ACTIVE_VIEWS: usize = 10;

struct PoolInner {
    browser: Option<Arc<dyn BrowserHandle>>,
    sessions: HashMap<String, Arc<ViewSession>>,
    /// view-id → reservation expiry (millis).
    reservations: HashMap<String, i64>,
    /// 0 until the first maintenance pass.
    last_any_active_ts: i64,
}

pub struct RendererPool {
    driver: Arc<dyn BrowserDriver>,
    settings: Settings,
    inner: Mutex<PoolInner>,
    subscriptions: Arc<SubscriptionRegistry>,
    waiters: Arc<FrameWaiters>,
    state_sink: Arc<dyn StateSink>,
    events_tx: UnboundedSender<FrameEvent>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl RendererPool {
    pub fn new(
        settings: Settings,
        driver: Arc<dyn BrowserDriver>,
        state_sink: Arc<dyn StateSink>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            driver,
            settings,
            inner: Mutex::new(PoolInner {
                browser: None,
                sessions: HashMap::new(),
                reservations: HashMap::new(),
                last_any_active_ts: 0,
            }),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            waiters: Arc::new(FrameWaiters::new()),
            state_sink,
            events_tx,
            tasks: StdMutex::new(Vec::new()),
        });
        pool.spawn_fanout(events_rx);
        pool.spawn_maintenance();
        pool
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    fn max_active_views(&self) -> usize {
        self.settings
            .max_active_views
            .clamp(MIN_ACTIVE_VIEWS, MAX_ACTIVE_VIEWS)
    }

    fn tuning(&self) -> SessionTuning {
        SessionTuning {
            capture_max_interval_ms: self.settings.capture_max_interval_ms,
            auto_reload_ms: self.settings.auto_reload_ms,
            cache_bust_on_reload: self.settings.cache_bust_on_reload,
        }
    }

    // -----------------------------------------------------------------------
    // Admission control
    // -----------------------------------------------------------------------

    /// Live-or-reserved view ids. Expired reservations are pruned on every
    /// query.
    fn active_view_ids(&self, inner: &mut PoolInner, now: i64) -> BTreeSet<String> {
        inner.reservations.retain(|_, expiry| *expiry > now);
        let grace = self.settings.inactive_grace_ms;
        let mut ids: BTreeSet<String> = inner
            .sessions
            .iter()
            .filter(|(_, session)| session.wanted(now, grace))
            .map(|(id, _)| id.clone())
            .collect();
        ids.extend(inner.reservations.keys().cloned());
        ids
    }

    fn admit_and_reserve(
        &self,
        inner: &mut PoolInner,
        view_id: &str,
        now: i64,
    ) -> Result<(), HudError> {
        let limit = self.max_active_views();
        let ids = self.active_view_ids(inner, now);
        if !ids.contains(view_id) && ids.len() >= limit {
            return Err(HudError::TooManyActiveViews {
                limit,
                active_views: ids.into_iter().collect(),
                requested: view_id.to_string(),
            });
        }
        inner
            .reservations
            .insert(view_id.to_string(), now + RESERVATION_TTL_MS);
        Ok(())
    }

    /// Non-reserving admission query.
    pub async fn can_activate(&self, view_id: &str) -> Result<(), HudError> {
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        let limit = self.max_active_views();
        let ids = self.active_view_ids(&mut inner, now);
        if ids.contains(view_id) || ids.len() < limit {
            Ok(())
        } else {
            Err(HudError::TooManyActiveViews {
                limit,
                active_views: ids.into_iter().collect(),
                requested: view_id.to_string(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Activation paths
    // -----------------------------------------------------------------------

    /// Admission + reservation + browser/session bring-up, serialized under
    /// the pool lock so a burst of parallel requests cannot overshoot the cap.
    async fn ensure_started(&self, view: &ViewConfig) -> Result<Arc<ViewSession>, HudError> {
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        self.admit_and_reserve(&mut inner, &view.id, now)?;

        if inner.browser.is_none() {
            let opts = LaunchOptions::new(self.settings.canvas_width, self.settings.canvas_height);
            let browser = self
                .driver
                .launch(&opts)
                .await
                .map_err(|err| HudError::Browser(format!("{err:#}")))?;
            info!(
                width = self.settings.canvas_width,
                height = self.settings.canvas_height,
                "launched headless browser"
            );
            inner.browser = Some(browser);
            self.state_sink.set_state(keys::INFO_CONNECTION, json!(true));
        }

        let session = match inner.sessions.get(&view.id) {
            Some(session) => session.clone(),
            None => {
                debug!(view = %view.id, "creating session");
                let session = ViewSession::spawn(
                    view.clone(),
                    self.tuning(),
                    self.events_tx.clone(),
                    self.state_sink.clone(),
                );
                inner.sessions.insert(view.id.clone(), session.clone());
                session
            }
        };
        session.ensure_loop();
        inner.last_any_active_ts = now;
        drop(inner);

        if session.view() != *view {
            session.set_view(view.clone()).await;
        }
        Ok(session)
    }

    /// Run one activation pass on a session right away instead of waiting for
    /// the next maintenance tick, to cut cold-start latency.
    async fn accelerate(&self, session: &Arc<ViewSession>) {
        let browser = self.inner.lock().await.browser.clone();
        session
            .tick(
                browser.as_ref(),
                now_ms(),
                self.settings.inactive_grace_ms,
                self.settings.close_page_after_inactive_ms,
            )
            .await;
    }

    /// Attach a WS subscriber to a view, activating it if admitted.
    pub async fn subscribe(&self, view: &ViewConfig) -> Result<(), HudError> {
        let session = self.ensure_started(view).await?;
        session.subscribe();
        self.accelerate(&session).await;
        Ok(())
    }

    /// Record an HTTP frame request for a view, activating it if admitted.
    pub async fn touch_http(&self, view: &ViewConfig) -> Result<(), HudError> {
        let session = self.ensure_started(view).await?;
        session.touch_http();
        self.accelerate(&session).await;
        Ok(())
    }

    /// The HTTP request path: admission gate + reservation + ensure-started +
    /// touch.
    pub async fn on_frame_request(&self, view: &ViewConfig) -> Result<(), HudError> {
        self.touch_http(view).await
    }

    /// Detach one subscriber from a view. Teardown is left to the inactivity
    /// ladder, never done here.
    pub async fn unsubscribe_view(&self, view_id: &str) {
        let session = self.inner.lock().await.sessions.get(view_id).cloned();
        if let Some(session) = session {
            let remaining = session.unsubscribe();
            debug!(view = view_id, remaining, "unsubscribed");
        }
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    pub async fn get_frame(&self, view_id: &str) -> Option<Frame> {
        let inner = self.inner.lock().await;
        inner.sessions.get(view_id).and_then(|s| s.last_frame())
    }

    /// Wait up to `wait_ms` for the next published frame. Returns true as
    /// soon as a frame exists.
    pub async fn wait_for_frame(&self, view_id: &str, wait_ms: u64) -> bool {
        if self.get_frame(view_id).await.is_some() {
            return true;
        }
        let (token, rx) = self.waiters.register(view_id);
        // A frame may have been published between the check and registration.
        if self.get_frame(view_id).await.is_some() {
            self.waiters.prune(view_id, token);
            return true;
        }
        match tokio::time::timeout(Duration::from_millis(wait_ms), rx).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(_)) => false,
            Err(_) => {
                self.waiters.prune(view_id, token);
                false
            }
        }
    }

    /// Force a capture on the next loop iteration. Returns false when no
    /// session exists for the view.
    pub async fn capture_now(&self, view_id: &str) -> bool {
        match self.inner.lock().await.sessions.get(view_id) {
            Some(session) => {
                session.request_capture_now();
                true
            }
            None => false,
        }
    }

    /// Force a reload on the next loop iteration.
    pub async fn reload_now(&self, view_id: &str) -> bool {
        match self.inner.lock().await.sessions.get(view_id) {
            Some(session) => {
                session.request_reload_now();
                true
            }
            None => false,
        }
    }

    pub async fn status(&self) -> PoolStatus {
        let inner = self.inner.lock().await;
        let now = now_ms();
        let grace = self.settings.inactive_grace_ms;
        let mut active_views: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, session)| session.wanted(now, grace))
            .map(|(id, _)| id.clone())
            .collect();
        active_views.sort();
        let mut sessions: Vec<_> = inner.sessions.values().map(|s| s.status()).collect();
        sessions.sort_by(|a, b| a.view_id.cmp(&b.view_id));
        PoolStatus {
            browser_open: inner.browser.is_some(),
            active_views,
            max_active_views: self.max_active_views(),
            sessions,
        }
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    fn spawn_fanout(&self, mut events_rx: UnboundedReceiver<FrameEvent>) {
        let subscriptions = self.subscriptions.clone();
        let waiters = self.waiters.clone();
        let sink = self.state_sink.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                waiters.resolve_all(&event.view_id, true);
                subscriptions.dispatch(&event);
                sink.set_state(keys::INFO_LAST_CAPTURE_TS, json!(event.frame.ts));
                sink.set_state(keys::INFO_LAST_ETAG, json!(event.frame.etag));
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    fn spawn_maintenance(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                pool.run_maintenance_once().await;
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    /// One maintenance pass: browser idle teardown, then activation gating on
    /// every session. Public so tests can drive it deterministically.
    pub async fn run_maintenance_once(&self) {
        let now = now_ms();
        let grace = self.settings.inactive_grace_ms;

        let mut inner = self.inner.lock().await;
        let any_wanted = inner.sessions.values().any(|s| s.wanted(now, grace));
        if any_wanted || inner.last_any_active_ts == 0 {
            inner.last_any_active_ts = now;
        }

        let close_after = self.settings.close_browser_after_inactive_ms;
        if inner.browser.is_some()
            && close_after > 0
            && now - inner.last_any_active_ts >= close_after as i64
        {
            let browser = inner.browser.take();
            let sessions: Vec<_> = inner.sessions.values().cloned().collect();
            drop(inner);
            info!("closing idle browser");
            for session in &sessions {
                session.stop_loop().await;
                session.invalidate_page();
            }
            if let Some(browser) = browser {
                if let Err(err) = browser.close().await {
                    warn!(error = %format!("{err:#}"), "browser close failed");
                }
            }
            self.state_sink
                .set_state(keys::INFO_CONNECTION, json!(false));
            return;
        }

        if inner.browser.is_none() && !any_wanted {
            // Cold pool stays cold; don't poll sessions.
            return;
        }

        let browser = inner.browser.clone();
        let sessions: Vec<_> = inner.sessions.values().cloned().collect();
        drop(inner);

        for session in sessions {
            session
                .tick(
                    browser.as_ref(),
                    now,
                    grace,
                    self.settings.close_page_after_inactive_ms,
                )
                .await;
        }
    }

    /// Stop every session loop, close the browser, and cancel the pool tasks.
    pub async fn shutdown(&self) {
        let (browser, sessions) = {
            let mut inner = self.inner.lock().await;
            (
                inner.browser.take(),
                inner.sessions.drain().map(|(_, s)| s).collect::<Vec<_>>(),
            )
        };
        for session in &sessions {
            session.stop().await;
        }
        if let Some(browser) = browser {
            let _ = browser.close().await;
        }
        self.state_sink
            .set_state(keys::INFO_CONNECTION, json!(false));
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        info!("renderer pool shut down");
    }
}
