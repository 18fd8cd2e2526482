//! Unified rejection type for the middleware pipeline.
//!
//! Every wrapper that stops the chain does so by returning a `GatewayError`.
//! Response bodies carry a short fixed message; the detailed reason is logged
//! (and, for server-side failures, captured to Sentry) keyed by request ID.

use std::time::Duration;

use axum::{
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use lumen_core::RequestId;
use thiserror::Error;

/// Rejection produced by a middleware.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No valid session accompanies the request.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// No valid session, and the client should be sent to the login page.
    #[error("Login required, redirecting to {location}")]
    LoginRequired {
        /// Login page path.
        location: String,
    },

    /// The authenticated role lacks the required grant.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The input firewall rejected the request.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request body exceeds the configured limit.
    #[error("Payload too large (limit {limit} bytes)")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The route does not accept this method.
    #[error("Method {method} not allowed")]
    MethodNotAllowed {
        /// Method the client used.
        method: Method,
        /// Methods the route accepts.
        allowed: Vec<Method>,
    },

    /// Nothing the server produces satisfies `Accept`.
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    /// The client exhausted its rate limit.
    #[error("Rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// How long until the next request would be admitted.
        retry_after: Duration,
    },

    /// Missing or mismatched anti-forgery token.
    #[error("CSRF validation failed: {0}")]
    Csrf(String),

    /// Plain-HTTP request in strict HTTPS mode.
    #[error("HTTPS required, redirecting to {location}")]
    HttpsRequired {
        /// HTTPS variant of the requested URL.
        location: String,
        /// Use `301` instead of `302`.
        permanent: bool,
    },

    /// A recovered fault or other server-side failure.
    #[error("Internal error: {detail}")]
    Internal {
        /// What went wrong (logged, never sent to the client).
        detail: String,
        /// Request the failure belongs to.
        request_id: Option<RequestId>,
    },
}

impl GatewayError {
    /// HTTP status for this rejection.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::LoginRequired { .. } => StatusCode::FOUND,
            Self::Forbidden(_) | Self::Csrf(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::HttpsRequired {
                permanent: true, ..
            } => StatusCode::MOVED_PERMANENTLY,
            Self::HttpsRequired { .. } => StatusCode::FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used in security log records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) | Self::LoginRequired { .. } => "unauthenticated",
            Self::Forbidden(_) => "unauthorized",
            Self::Validation(_) | Self::PayloadTooLarge { .. } => "validation-failure",
            Self::MethodNotAllowed { .. } => "method-not-allowed",
            Self::NotAcceptable(_) => "not-acceptable",
            Self::RateLimited { .. } => "rate-limited",
            Self::Csrf(_) => "csrf-failure",
            Self::HttpsRequired { .. } => "scheme-required",
            Self::Internal { .. } => "internal-failure",
        }
    }

    /// Client-facing message. Never includes internal detail.
    fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated(_) | Self::LoginRequired { .. } => {
                "Authentication required".to_string()
            }
            Self::Forbidden(_) => "Permission denied".to_string(),
            Self::Validation(reason) => format!("Invalid request: {reason}"),
            Self::PayloadTooLarge { .. } => "Request body too large".to_string(),
            Self::MethodNotAllowed { .. } => "Method not allowed".to_string(),
            Self::NotAcceptable(_) => "Not acceptable".to_string(),
            Self::RateLimited { .. } => "Too many requests".to_string(),
            Self::Csrf(_) => "CSRF token missing or invalid".to_string(),
            Self::HttpsRequired { .. } => "HTTPS required".to_string(),
            Self::Internal {
                request_id: Some(id),
                ..
            } => format!("Internal server error (request id: {id})"),
            Self::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

/// Join methods for an `Allow` header.
#[must_use]
pub fn allow_header_value(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let Self::Internal { detail, request_id } = &self {
            let event_id = sentry::capture_message(detail, sentry::Level::Error);
            tracing::error!(
                error = %detail,
                request_id = request_id.as_ref().map(RequestId::as_str),
                sentry_event_id = %event_id,
                "Request failed"
            );
        }

        let status = self.status();
        let mut response = (status, self.public_message()).into_response();
        let headers = response.headers_mut();

        match &self {
            Self::LoginRequired { location } | Self::HttpsRequired { location, .. } => {
                if let Ok(value) = HeaderValue::from_str(location) {
                    headers.insert(header::LOCATION, value);
                }
            }
            Self::MethodNotAllowed { allowed, .. } => {
                if let Ok(value) = HeaderValue::from_str(&allow_header_value(allowed)) {
                    headers.insert(header::ALLOW, value);
                }
            }
            Self::RateLimited { retry_after } => {
                // Round up so clients never retry early.
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
            }
            _ => {}
        }

        response
    }
}

/// Result type alias for `GatewayError`.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: GatewayError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Validation("bad where clause".to_string());
        assert_eq!(err.to_string(), "Validation failed: bad where clause");
    }

    #[test]
    fn test_gateway_error_status_codes() {
        assert_eq!(
            get_status(GatewayError::Unauthenticated("no cookie".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(GatewayError::Forbidden("no grant".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(GatewayError::Csrf("missing".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(GatewayError::PayloadTooLarge { limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            get_status(GatewayError::NotAcceptable("x".into())),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            get_status(GatewayError::HttpsRequired {
                location: "https://a/".into(),
                permanent: true
            }),
            StatusCode::MOVED_PERMANENTLY
        );
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = GatewayError::MethodNotAllowed {
            method: Method::DELETE,
            allowed: vec![Method::GET, Method::POST],
        }
        .into_response();
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");
    }

    #[test]
    fn test_rate_limited_rounds_retry_after_up() {
        let response = GatewayError::RateLimited {
            retry_after: Duration::from_millis(1500),
        }
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let response = GatewayError::RateLimited {
            retry_after: Duration::ZERO,
        }
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_login_required_redirects() {
        let response = GatewayError::LoginRequired {
            location: "/login".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[test]
    fn test_internal_message_hides_detail() {
        let err = GatewayError::Internal {
            detail: "index out of bounds: the len is 3".into(),
            request_id: Some(RequestId::new("req-9")),
        };
        let message = err.public_message();
        assert!(message.contains("req-9"));
        assert!(!message.contains("index out of bounds"));
    }
}
