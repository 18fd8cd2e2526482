//! Security headers middleware for XSS, clickjacking, and sniffing protection.
//!
//! `X-Content-Type-Options` and `X-XSS-Protection` are always forced. The
//! remaining headers are defaults: a handler that sets its own value (for
//! example a looser CSP on an export page) keeps it.

use axum::{
    extract::Request,
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{
            CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
            X_XSS_PROTECTION,
        },
    },
    middleware::Next,
    response::Response,
};

/// Default CSP for the query console and table browser.
const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'self'; \
     script-src 'self'; \
     style-src 'self'; \
     img-src 'self' data:; \
     font-src 'self'; \
     connect-src 'self'; \
     object-src 'none'; \
     base-uri 'self'; \
     form-action 'self'; \
     frame-ancestors 'none'";

/// Deny sensitive browser features; the console needs none of them.
const PERMISSIONS_POLICY_VALUE: &str = "accelerometer=(), \
     camera=(), \
     display-capture=(), \
     geolocation=(), \
     gyroscope=(), \
     magnetometer=(), \
     microphone=(), \
     payment=(), \
     usb=()";

fn set_default(headers: &mut HeaderMap, name: HeaderName, value: &'static str) {
    if !headers.contains_key(&name) {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

/// Add security headers to all responses.
///
/// Forced:
/// - `X-Content-Type-Options: nosniff` - Prevent MIME sniffing
/// - `X-XSS-Protection: 1; mode=block` - Legacy XSS auditor
///
/// Set unless the handler already did:
/// - `X-Frame-Options: DENY` - Prevent clickjacking
/// - `Content-Security-Policy` - Same-origin scripts and styles only
/// - `Referrer-Policy: strict-origin-when-cross-origin`
/// - `Permissions-Policy` - Deny sensitive features
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));

    set_default(headers, X_FRAME_OPTIONS, "DENY");
    set_default(headers, CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY_VALUE);
    set_default(headers, REFERRER_POLICY, "strict-origin-when-cross-origin");
    set_default(
        headers,
        HeaderName::from_static("permissions-policy"),
        PERMISSIONS_POLICY_VALUE,
    );

    response
}
