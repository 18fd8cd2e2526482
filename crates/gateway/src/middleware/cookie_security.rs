//! Cookie hardening: signature checks, `SameSite` rewriting and HTTPS enforcement.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::config::SameSitePolicy;
use crate::context::RequestContext;
use crate::cookies::{self, SIGNATURE_SUFFIX};
use crate::error::GatewayError;
use crate::state::AppState;

// =============================================================================
// Signature verification
// =============================================================================

/// Reject requests carrying a signed cookie whose signature does not verify.
///
/// Cookies without a `<name>_signature` companion are not checked.
pub async fn validate_cookie_integrity(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let jar = cookies::jar(request.headers());
    let tampered = jar
        .iter()
        .filter(|c| !c.name().ends_with(SIGNATURE_SUFFIX))
        .find(|c| {
            jar.get(&cookies::signature_name(c.name()))
                .is_some_and(|sig| !state.signer().verify(c.name(), c.value(), sig.value()))
        })
        .map(|c| c.name().to_string());

    if let Some(name) = tampered {
        tracing::warn!(
            cookie = %name,
            request_id = RequestContext::get(request.extensions()).and_then(RequestContext::request_id_str),
            "Cookie signature mismatch"
        );
        return GatewayError::Unauthenticated(format!("cookie '{name}' failed signature check"))
            .into_response();
    }
    next.run(request).await
}

// =============================================================================
// SameSite enforcement
// =============================================================================

const fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::Strict => SameSite::Strict,
    }
}

/// Rewrite one `Set-Cookie` value, or `None` when it already complies.
fn rewrite_set_cookie(value: &str, policy: SameSite) -> Option<String> {
    let mut cookie = Cookie::parse(value.to_owned()).ok()?;
    match cookie.same_site() {
        Some(SameSite::Lax | SameSite::Strict) => None,
        Some(SameSite::None) | None => {
            cookie.set_same_site(policy);
            Some(cookie.to_string())
        }
    }
}

fn enforce_on(headers: &mut HeaderMap, policy: SameSite) {
    let values: Vec<HeaderValue> = headers.get_all(header::SET_COOKIE).iter().cloned().collect();
    if values.is_empty() {
        return;
    }
    headers.remove(header::SET_COOKIE);
    for value in values {
        let rewritten = value
            .to_str()
            .ok()
            .and_then(|v| rewrite_set_cookie(v, policy))
            .and_then(|v| HeaderValue::from_str(&v).ok());
        headers.append(header::SET_COOKIE, rewritten.unwrap_or(value));
    }
}

/// Give every cookie set downstream an explicit `SameSite` of `Lax` or `Strict`.
pub async fn enforce_same_site_cookie(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let policy = same_site(state.config().cookies.same_site);
    let mut response = next.run(request).await;
    enforce_on(response.headers_mut(), policy);
    response
}

// =============================================================================
// HTTPS enforcement
// =============================================================================

/// Hosts that may use plain HTTP even in strict mode.
const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Host name without port or IPv6 brackets.
fn host_name(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) && !name.contains(':') => name,
        _ => host,
    }
}

/// Whether a redirect may name `name`. An empty list admits any host.
fn is_public_host(public_hosts: &[String], name: &str) -> bool {
    public_hosts.is_empty() || public_hosts.iter().any(|h| host_name(h).eq_ignore_ascii_case(name))
}

fn is_https(request: &Request) -> bool {
    let forwarded = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    match forwarded {
        Some(proto) => proto.eq_ignore_ascii_case("https"),
        None => request.uri().scheme_str() == Some("https"),
    }
}

fn request_host(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_owned()))
}

/// In strict mode, redirect plain-HTTP requests to their HTTPS equivalent.
pub async fn require_https_for_cookies(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config().cookies.strict_https || is_https(&request) {
        return next.run(request).await;
    }

    let Some(host) = request_host(&request) else {
        return GatewayError::Validation("missing Host header".into()).into_response();
    };
    let name = host_name(&host);
    if LOOPBACK_HOSTS.contains(&name) {
        return next.run(request).await;
    }
    if !is_public_host(&state.config().cookies.public_hosts, name) {
        tracing::warn!(host = %name, "Refusing HTTPS redirect to unlisted host");
        return GatewayError::Validation(format!("unknown host: {name}")).into_response();
    }

    let bracketed = if name.contains(':') {
        format!("[{name}]")
    } else {
        name.to_string()
    };
    let path_and_query = request
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let location = format!("https://{bracketed}{path_and_query}");
    let permanent = matches!(*request.method(), Method::GET | Method::HEAD);

    tracing::info!(%location, permanent, "Redirecting plain-HTTP request to HTTPS");
    GatewayError::HttpsRequired { location, permanent }.into_response()
}
