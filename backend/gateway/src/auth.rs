//! Shared bearer/query token authentication.
//!
//! Both surfaces accept either `?token=<T>` or `Authorization: Bearer <T>`.
//! With no token configured, everything is open.

use axum::http::{header, HeaderMap};

use hudbridge_config::Settings;
use hudbridge_core::HudError;

pub fn check_token(
    settings: &Settings,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<(), HudError> {
    let Some(expected) = settings.auth_token.as_deref() else {
        return Ok(());
    };
    if query_token == Some(expected) {
        return Ok(());
    }
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(bearer) = value.strip_prefix("Bearer ") {
            if bearer == expected {
                return Ok(());
            }
        }
    }
    Err(HudError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use hudbridge_config::{normalize, HudBridgeConfig};

    fn settings(token: Option<&str>) -> Settings {
        let raw = HudBridgeConfig {
            auth_token: token.map(str::to_string),
            ..Default::default()
        };
        normalize(&raw).0
    }

    #[test]
    fn open_when_no_token_configured() {
        let settings = settings(None);
        assert!(check_token(&settings, &HeaderMap::new(), None).is_ok());
    }

    #[test]
    fn accepts_query_or_bearer() {
        let settings = settings(Some("s3cret"));
        assert!(check_token(&settings, &HeaderMap::new(), Some("s3cret")).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer s3cret"),
        );
        assert!(check_token(&settings, &headers, None).is_ok());
    }

    #[test]
    fn rejects_wrong_or_missing_token() {
        let settings = settings(Some("s3cret"));
        assert!(check_token(&settings, &HeaderMap::new(), None).is_err());
        assert!(check_token(&settings, &HeaderMap::new(), Some("nope")).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer nope"),
        );
        assert!(check_token(&settings, &headers, None).is_err());
    }
}
