//! Fallback response headers.

use axum::http::{HeaderValue, header};
use tower::layer::util::Stack;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::DefaultHeadersConfig;

/// Layer pair setting `Content-Type` and `Cache-Control` when the handler did not.
pub type DefaultHeadersLayer =
    Stack<SetResponseHeaderLayer<HeaderValue>, SetResponseHeaderLayer<HeaderValue>>;

fn header_value(configured: &str, fallback: &'static str) -> HeaderValue {
    HeaderValue::from_str(configured).unwrap_or_else(|_| {
        tracing::warn!(configured, fallback, "Invalid default header value, using fallback");
        HeaderValue::from_static(fallback)
    })
}

/// Build the default-headers layer from configuration.
#[must_use]
pub fn default_headers(config: &DefaultHeadersConfig) -> DefaultHeadersLayer {
    Stack::new(
        SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            header_value(&config.content_type, "application/json; charset=utf-8"),
        ),
        SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            header_value(&config.cache_control, "no-store"),
        ),
    )
}
