//! Per-route HTTP method allow-lists.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;

/// Methods a route accepts, in the order they are advertised in `Allow`.
#[derive(Debug, Clone)]
pub struct AllowedMethods(Arc<[Method]>);

impl AllowedMethods {
    /// Allow exactly `methods`.
    #[must_use]
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        let mut list: Vec<Method> = Vec::new();
        for method in methods {
            if !list.contains(&method) {
                list.push(method);
            }
        }
        Self(list.into())
    }

    /// Whether `method` is allowed. Extension methods compare case-sensitively.
    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        self.0.contains(method)
    }

    /// The allowed methods.
    #[must_use]
    pub fn as_slice(&self) -> &[Method] {
        &self.0
    }
}

/// Reject requests whose method is not in the allow-list with `405` and `Allow`.
///
/// # Example
///
/// ```rust,ignore
/// Router::new()
///     .route("/api/rows", any(rows))
///     .layer(from_fn_with_state(
///         AllowedMethods::new([Method::GET, Method::POST]),
///         validate_http_method,
///     ));
/// ```
pub async fn validate_http_method(
    State(allowed): State<AllowedMethods>,
    request: Request,
    next: Next,
) -> Response {
    if allowed.contains(request.method()) {
        return next.run(request).await;
    }

    tracing::debug!(method = %request.method(), path = %request.uri().path(), "Method rejected");
    GatewayError::MethodNotAllowed {
        method: request.method().clone(),
        allowed: allowed.as_slice().to_vec(),
    }
    .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{StatusCode, header},
        middleware::from_fn_with_state,
        routing::any,
    };
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        Router::new()
            .route("/", any(|| async { "ok" }))
            .layer(from_fn_with_state(
                AllowedMethods::new([Method::GET, Method::POST, Method::GET]),
                validate_http_method,
            ))
    }

    async fn send(method: Method) -> Response {
        app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_allowed_methods_forward() {
        assert_eq!(send(Method::GET).await.status(), StatusCode::OK);
        assert_eq!(send(Method::POST).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disallowed_method_gets_405_with_allow() {
        let response = send(Method::DELETE).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");
    }

    #[tokio::test]
    async fn test_method_comparison_is_case_sensitive() {
        let lower = Method::from_bytes(b"get").unwrap();
        assert_eq!(send(lower).await.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
