pub mod auth;
pub mod control;
pub mod frame_api;
pub mod responses;
pub mod server;
pub mod status_api;
pub mod ws_protocol;
pub mod ws_server;

pub use server::{build_router, serve, GatewayState};
