//! Environment variable overrides.
//!
//! Applied after the config file is loaded and before normalization, so the
//! usual clamping still governs env-supplied values.

use tracing::warn;

use crate::schema::HudBridgeConfig;

pub const ENV_LISTEN_HOST: &str = "HUDBRIDGE_LISTEN_HOST";
pub const ENV_LISTEN_PORT: &str = "HUDBRIDGE_LISTEN_PORT";
pub const ENV_AUTH_TOKEN: &str = "HUDBRIDGE_AUTH_TOKEN";
pub const ENV_LOG_LEVEL: &str = "HUDBRIDGE_LOG_LEVEL";

/// Overlay recognized environment variables onto a raw config.
pub fn apply_env_overrides(config: &mut HudBridgeConfig) {
    if let Ok(host) = std::env::var(ENV_LISTEN_HOST) {
        config.listen_host = Some(host);
    }
    if let Ok(port) = std::env::var(ENV_LISTEN_PORT) {
        match port.parse::<f64>() {
            Ok(parsed) => config.listen_port = Some(parsed),
            Err(_) => warn!(value = %port, "ignoring unparsable {}", ENV_LISTEN_PORT),
        }
    }
    if let Ok(token) = std::env::var(ENV_AUTH_TOKEN) {
        config.auth_token = Some(token);
    }
    if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
        config.log_level = Some(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = HudBridgeConfig {
            listen_host: Some("127.0.0.1".into()),
            ..Default::default()
        };
        // Env access in tests is process-global; use a key unlikely to exist
        // and set/remove it around the call.
        std::env::set_var(ENV_LISTEN_HOST, "0.0.0.0");
        std::env::set_var(ENV_LISTEN_PORT, "9100");
        apply_env_overrides(&mut config);
        std::env::remove_var(ENV_LISTEN_HOST);
        std::env::remove_var(ENV_LISTEN_PORT);

        assert_eq!(config.listen_host.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.listen_port, Some(9100.0));
    }
}
