//! Cold-start frame waiters.
//!
//! An HTTP request for a view that has no frame yet parks here until the
//! session publishes its first frame or the per-request wait budget runs out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

#[derive(Default)]
pub struct FrameWaiters {
    pending: Mutex<HashMap<String, Vec<(u64, oneshot::Sender<bool>)>>>,
    next_token: AtomicU64,
}

impl FrameWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a waiter for `view_id`. The returned token identifies the waiter
    /// for pruning after a timeout.
    pub fn register(&self, view_id: &str) -> (u64, oneshot::Receiver<bool>) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .entry(view_id.to_string())
            .or_default()
            .push((token, tx));
        (token, rx)
    }

    /// Resolve every waiter parked on `view_id`.
    pub fn resolve_all(&self, view_id: &str, ok: bool) {
        let waiters = self.pending.lock().unwrap().remove(view_id);
        if let Some(waiters) = waiters {
            debug!(view = view_id, count = waiters.len(), "resolving frame waiters");
            for (_, tx) in waiters {
                let _ = tx.send(ok);
            }
        }
    }

    /// Drop a single timed-out waiter.
    pub fn prune(&self, view_id: &str, token: u64) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(waiters) = pending.get_mut(view_id) {
            waiters.retain(|(t, _)| *t != token);
            if waiters.is_empty() {
                pending.remove(view_id);
            }
        }
    }

    pub fn pending_count(&self, view_id: &str) -> usize {
        self.pending
            .lock()
            .unwrap()
            .get(view_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_wakes_all_waiters() {
        let waiters = FrameWaiters::new();
        let (_, rx1) = waiters.register("a");
        let (_, rx2) = waiters.register("a");
        let (_, rx_other) = waiters.register("b");

        waiters.resolve_all("a", true);
        assert_eq!(rx1.await, Ok(true));
        assert_eq!(rx2.await, Ok(true));
        assert_eq!(waiters.pending_count("a"), 0);
        assert_eq!(waiters.pending_count("b"), 1);
        drop(rx_other);
    }

    #[tokio::test]
    async fn prune_removes_only_the_token() {
        let waiters = FrameWaiters::new();
        let (t1, rx1) = waiters.register("a");
        let (_, rx2) = waiters.register("a");
        waiters.prune("a", t1);
        assert_eq!(waiters.pending_count("a"), 1);

        waiters.resolve_all("a", false);
        assert_eq!(rx2.await, Ok(false));
        // The pruned waiter's sender was dropped.
        assert!(rx1.await.is_err());
    }
}
