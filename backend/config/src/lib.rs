pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use schema::{HudBridgeConfig, RawViewEntry, Settings};
pub use validation::{normalize, ConfigValidationError, ValidationReport};
