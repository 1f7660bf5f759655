pub mod cache_bust;
pub mod pool;
pub mod session;
pub mod subscribers;
pub mod waiters;

pub use pool::RendererPool;
pub use session::ViewSession;
pub use subscribers::{SubscriberId, SubscriptionRegistry};
pub use waiters::FrameWaiters;

use hudbridge_core::Frame;

/// Published by a session whenever a view's rendered pixels change.
#[derive(Debug, Clone)]
pub struct FrameEvent {
    pub view_id: String,
    pub frame: Frame,
}
