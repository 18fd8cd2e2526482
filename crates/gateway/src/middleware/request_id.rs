//! Request ID middleware for request tracing and correlation.
//!
//! Generates a UUID v4 for each request if not provided by an upstream proxy
//! (e.g., a load balancer). The request ID is:
//! - Stored in the request context
//! - Recorded in the current tracing span
//! - Added to the Sentry scope for error correlation
//! - Returned in the response headers

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use lumen_core::RequestId;
use tracing::Span;
use uuid::Uuid;

use crate::context::RequestContext;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest inbound ID we adopt; anything longer is replaced.
const MAX_INBOUND_LEN: usize = 128;

/// Whether an inbound ID is safe to echo into headers and logs.
fn is_acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_INBOUND_LEN
        && id.bytes().all(|b| b.is_ascii_graphic())
}

/// Middleware that ensures every request has a unique request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used
/// (provided it is printable ASCII of reasonable length). Otherwise, a new
/// UUID v4 is generated. An ID already present in the request context is
/// kept as-is.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let existing = RequestContext::get(request.extensions()).and_then(|c| c.request_id.clone());

    let request_id = existing.unwrap_or_else(|| {
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|id| is_acceptable(id))
            .map_or_else(|| RequestId::new(Uuid::new_v4().to_string()), RequestId::from)
    });

    RequestContext::update(&mut request, |c| c.request_id = Some(request_id.clone()));

    // Record in current span for structured logging
    Span::current().record("request_id", request_id.as_str());

    // Set in Sentry scope for error correlation
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    let mut response = next.run(request).await;

    // Add to response headers so clients can reference the request ID
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
