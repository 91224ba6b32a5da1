//! CORS middleware.
//!
//! Wrapper around tower-http CORS driven by [`CorsConfig`]. Browsers connect
//! from a fixed set of front-end origins; everything else is refused.

use crate::domain::config::CorsConfig;
use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer as TowerCorsLayer};

/// Create CORS layer from relay config
pub fn create_cors_layer(config: &CorsConfig) -> TowerCorsLayer {
    if !config.enabled {
        return TowerCorsLayer::very_permissive();
    }

    let mut cors = TowerCorsLayer::new();

    if config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(Any);
    } else {
        cors = cors.allow_origin(parse_origins(&config.allowed_origins));
    }

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    cors = cors.allow_methods(methods);

    if config.allowed_headers.iter().any(|h| h == "*") {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    cors.max_age(Duration::from_secs(config.max_age))
}

/// Origins that parse as header values; invalid entries are skipped.
fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins.iter().filter_map(|o| o.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(config: &CorsConfig) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(create_cors_layer(config))
    }

    async fn preflight(config: &CorsConfig, origin: &str) -> Option<HeaderValue> {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = app(config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .cloned()
    }

    #[test]
    fn test_invalid_origins_skipped() {
        let parsed = parse_origins(&["https://ok.example".to_string(), "bad\norigin".to_string()]);
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn test_default_origin_allowed() {
        let config = CorsConfig::default();
        let allowed = preflight(&config, "https://neurosift.app").await;
        assert_eq!(allowed.unwrap(), "https://neurosift.app");
    }

    #[tokio::test]
    async fn test_unknown_origin_not_allowed() {
        let config = CorsConfig::default();
        assert!(preflight(&config, "https://evil.example").await.is_none());
    }

    #[tokio::test]
    async fn test_wildcard_origin() {
        let config = CorsConfig {
            allowed_origins: vec!["*".to_string()],
            ..CorsConfig::default()
        };
        assert_eq!(
            preflight(&config, "https://any.example").await.unwrap(),
            "*"
        );
    }
}
