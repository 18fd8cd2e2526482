//! CORS policy built on tower-http's `CorsLayer`.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::config::CorsConfig;
use crate::middleware::request_id::REQUEST_ID_HEADER;

/// Methods advertised on preflight.
const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Build the CORS layer.
///
/// With no configured origins any request origin is mirrored, with
/// `Access-Control-Allow-Credentials` only when credentials are allowed.
/// Requests without an `Origin` header get no allow-origin header.
#[must_use]
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(config.max_age);

    if config.allowed_origins.is_empty() {
        return layer
            .allow_origin(AllowOrigin::mirror_request())
            .allow_credentials(config.allow_credentials);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(config.allow_credentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        response::Response,
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;

    fn app(config: &CorsConfig) -> Router {
        Router::new()
            .route("/api/rows", get(|| async { "rows" }))
            .layer(cors_layer(config))
    }

    async fn preflight(config: &CorsConfig, origin: &str) -> Response {
        app(config)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/rows")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,x-csrf-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_preflight_mirrors_origin_with_credentials() {
        let config = CorsConfig::default();
        let response = preflight(&config, "https://console.example.com").await;
        assert_eq!(response.status(), StatusCode::OK);

        let h = response.headers();
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://console.example.com");
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_HEADERS], "content-type,x-csrf-token");
        assert_eq!(h[header::ACCESS_CONTROL_MAX_AGE], "600");
        let methods = h[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        for m in ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"] {
            assert!(methods.contains(m), "{methods}");
        }
        assert!(
            h.get_all(header::VARY)
                .iter()
                .any(|v| v.to_str().unwrap().contains("origin"))
        );
    }

    #[tokio::test]
    async fn test_any_origin_without_credentials() {
        let config = CorsConfig {
            allowed_origins: Vec::new(),
            allow_credentials: false,
            max_age: Duration::from_secs(60),
        };
        let response = preflight(&config, "https://anywhere.example").await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://anywhere.example"
        );
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());

        let plain = app(&config)
            .oneshot(Request::builder().uri("/api/rows").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(plain.status(), StatusCode::OK);
        assert!(plain.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_configured_list() {
        let config = CorsConfig {
            allowed_origins: vec!["https://console.example.com".into()],
            ..CorsConfig::default()
        };
        let allowed = preflight(&config, "https://console.example.com").await;
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://console.example.com"
        );

        let other = preflight(&config, "https://evil.example").await;
        assert!(other.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_no_origin_no_allow_origin() {
        let response = app(&CorsConfig::default())
            .oneshot(Request::builder().uri("/api/rows").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
