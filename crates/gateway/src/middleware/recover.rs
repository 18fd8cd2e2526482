//! Panic recovery and error relaying.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::{extract::Request, middleware::Next, response::IntoResponse, response::Response};
use futures::FutureExt;

use crate::context::{ContextTrail, RequestContext};
use crate::error::GatewayError;

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Catch panics raised while producing the downstream response.
///
/// The panic is logged with the context as the inner stages last left it
/// (user, session and transaction included), and the client receives a `500`
/// naming only the request ID.
pub async fn recover_from_panic(mut request: Request, next: Next) -> Response {
    let trail = ContextTrail::install(&mut request);
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let context = trail.latest();
            tracing::error!(
                request_id = context.request_id_str(),
                user = context.username_str(),
                session_present = context.session.is_some(),
                transaction = context.transaction.as_ref().map(|t| t.id.as_str()),
                query = context.query.as_deref(),
                method = %method,
                path = %path,
                panic = %message,
                "Recovered from panic in request handler"
            );
            GatewayError::Internal {
                detail: format!("panic while handling {method} {path}: {message}"),
                request_id: context.request_id,
            }
            .into_response()
        }
    }
}

/// Relay downstream error responses untouched, logging them with the request ID.
pub async fn handle_errors(request: Request, next: Next) -> Response {
    let request_id = RequestContext::get(request.extensions())
        .and_then(|c| c.request_id.clone());
    let response = next.run(request).await;

    let status = response.status();
    let request_id = request_id.as_ref().map(|id| id.as_str());
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), request_id, "Handler returned server error");
    } else if status.is_client_error() {
        tracing::debug!(status = status.as_u16(), request_id, "Handler returned client error");
    }

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::StatusCode,
        middleware::from_fn,
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::request_id::{REQUEST_ID_HEADER, request_id_middleware};

    async fn explode() -> &'static str {
        panic!("deliberate failure")
    }

    async fn out_of_bounds() -> String {
        let values: Vec<u8> = Vec::new();
        let index = values.len() + 2;
        values[index].to_string()
    }

    async fn teapot() -> (StatusCode, &'static str) {
        (StatusCode::CONFLICT, "already exists")
    }

    fn app() -> Router {
        Router::new()
            .route("/panic", get(explode))
            .route("/oob", get(out_of_bounds))
            .route("/conflict", get(teapot))
            .route("/ok", get(|| async { "fine" }))
            .layer(from_fn(handle_errors))
            .layer(from_fn(recover_from_panic))
            .layer(from_fn(request_id_middleware))
    }

    async fn get_path(path: &str) -> Response {
        app()
            .oneshot(
                Request::builder()
                    .uri(path)
                    .header(REQUEST_ID_HEADER, "req-panic-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_explicit_panic_becomes_500() {
        let response = get_path("/panic").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-panic-1");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("req-panic-1"));
        assert!(!body.contains("deliberate failure"));
    }

    #[tokio::test]
    async fn test_index_panic_becomes_500() {
        let response = get_path("/oob").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_error_status_relayed_verbatim() {
        let response = get_path("/conflict").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"already exists");
    }

    #[tokio::test]
    async fn test_success_untouched() {
        let response = get_path("/ok").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
