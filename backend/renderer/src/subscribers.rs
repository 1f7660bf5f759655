//! Subscriber registry and frame fan-out.
//!
//! Maps view-id → subscriber senders with the inverse mapping alongside, so
//! each subscriber is attached to at most one view at a time. Dispatch clones
//! the senders out of the lock; a slow or broken subscriber never blocks the
//! publisher.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use crate::FrameEvent;

pub type SubscriberId = Uuid;

#[derive(Default)]
struct RegistryInner {
    by_view: HashMap<String, HashMap<SubscriberId, UnboundedSender<FrameEvent>>>,
    by_subscriber: HashMap<SubscriberId, String>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `id` to `view_id`, replacing any previous attachment. Returns
    /// the previously subscribed view if there was one.
    pub fn register(
        &self,
        id: SubscriberId,
        view_id: &str,
        sender: UnboundedSender<FrameEvent>,
    ) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        let previous = inner.by_subscriber.insert(id, view_id.to_string());
        if let Some(prev) = &previous {
            if let Some(subs) = inner.by_view.get_mut(prev) {
                subs.remove(&id);
                if subs.is_empty() {
                    inner.by_view.remove(prev);
                }
            }
        }
        inner
            .by_view
            .entry(view_id.to_string())
            .or_default()
            .insert(id, sender);
        previous.filter(|prev| prev != view_id)
    }

    /// Detach `id`, returning the view it was attached to.
    pub fn unregister(&self, id: SubscriberId) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        let view_id = inner.by_subscriber.remove(&id)?;
        if let Some(subs) = inner.by_view.get_mut(&view_id) {
            subs.remove(&id);
            if subs.is_empty() {
                inner.by_view.remove(&view_id);
            }
        }
        Some(view_id)
    }

    pub fn subscribed_view(&self, id: SubscriberId) -> Option<String> {
        self.inner.lock().unwrap().by_subscriber.get(&id).cloned()
    }

    pub fn subscriber_count(&self, view_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .by_view
            .get(view_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Push a frame event to every subscriber of its view. Send failures are
    /// swallowed; a dead receiver is cleaned up when it unregisters.
    pub fn dispatch(&self, event: &FrameEvent) {
        let senders: Vec<UnboundedSender<FrameEvent>> = {
            let inner = self.inner.lock().unwrap();
            inner
                .by_view
                .get(&event.view_id)
                .map(|subs| subs.values().cloned().collect())
                .unwrap_or_default()
        };
        for sender in senders {
            if sender.send(event.clone()).is_err() {
                debug!(view = %event.view_id, "dropping frame for closed subscriber");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hudbridge_core::Frame;
    use tokio::sync::mpsc;

    fn event(view_id: &str) -> FrameEvent {
        FrameEvent {
            view_id: view_id.to_string(),
            frame: Frame::new(vec![1, 2, 3], 1),
        }
    }

    #[tokio::test]
    async fn subscriber_belongs_to_one_view() {
        let registry = SubscriptionRegistry::new();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(registry.register(id, "a", tx.clone()), None);
        assert_eq!(registry.subscriber_count("a"), 1);

        // Re-registering moves the subscriber and reports the old view.
        assert_eq!(registry.register(id, "b", tx), Some("a".to_string()));
        assert_eq!(registry.subscriber_count("a"), 0);
        assert_eq!(registry.subscriber_count("b"), 1);
        assert_eq!(registry.subscribed_view(id), Some("b".to_string()));

        registry.dispatch(&event("a"));
        registry.dispatch(&event("b"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.view_id, "b");

        assert_eq!(registry.unregister(id), Some("b".to_string()));
        assert_eq!(registry.subscriber_count("b"), 0);
    }

    #[test]
    fn dispatch_swallows_closed_receivers() {
        let registry = SubscriptionRegistry::new();
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(id, "a", tx);
        drop(rx);
        // Must not panic or error.
        registry.dispatch(&event("a"));
    }
}
