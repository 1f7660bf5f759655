use thiserror::Error;

/// Top-level error type for the HudBridge runtime.
///
/// Admission and validation failures are surfaced to clients as structured
/// responses; browser-side failures stay inside the session loops and only
/// reach this type at the driver boundary.
#[derive(Debug, Error)]
pub enum HudError {
    #[error("unknown or disabled view: {view_id}")]
    UnknownView { view_id: String },

    #[error("renderer pool is not ready")]
    RendererNotReady,

    #[error("too many active views (limit {limit}, requested {requested})")]
    TooManyActiveViews {
        limit: usize,
        active_views: Vec<String>,
        requested: String,
    },

    #[error("no frame available for view {view_id}")]
    NoFrame { view_id: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("browser driver error: {0}")]
    Browser(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HudError {
    /// Stable wire code shared by the HTTP and WebSocket surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            HudError::UnknownView { .. } => "unknown_view",
            HudError::RendererNotReady => "renderer_not_ready",
            HudError::TooManyActiveViews { .. } => "too_many_active_views",
            HudError::NoFrame { .. } => "no_frame",
            HudError::Unauthorized => "unauthorized",
            HudError::Browser(_) => "browser_error",
            HudError::Other(_) => "internal_error",
        }
    }
}
