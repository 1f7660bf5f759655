pub mod error;
pub mod frame;
pub mod state;
pub mod status;
pub mod types;

pub use error::HudError;
pub use frame::{quoted_sha1, Frame};
pub use state::{keys, MemoryStateSink, StateSink};
pub use status::{PoolStatus, SessionStatus};
pub use types::{now_ms, ViewConfig};
