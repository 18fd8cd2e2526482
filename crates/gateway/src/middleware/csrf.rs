//! Anti-forgery protection for state-changing requests.
//!
//! Two token schemes are accepted. A session-bound token is checked with the
//! host's [`lumen_core::CsrfValidator`]; failing that, a double-submit token
//! must equal the `csrf_token` cookie. [`issue_csrf_token`] hands that cookie
//! out to browsers that lack one.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, Method, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use lumen_core::{Session, SessionId};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::context::RequestContext;
use crate::cookies;
use crate::error::GatewayError;
use crate::state::AppState;

/// Header the frontend echoes the token in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Methods that never change state and skip the check.
fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

/// The double-submit token in effect for this request.
///
/// Either the browser's existing `csrf_token` cookie or the one
/// [`issue_csrf_token`] is about to set.
#[derive(Clone, Debug)]
pub struct CsrfToken(pub String);

impl CsrfToken {
    /// Generate a new random token (256-bit, base64url).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the token value for embedding in pages.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_else(|| {
            tracing::warn!("CSRF token not found in request extensions - middleware may be misconfigured");
            Self(String::new())
        }))
    }
}

/// Session the token should be bound to: the one in context, else the one
/// named by the `session_id` cookie.
async fn session_for(state: &AppState, known: Option<Session>, session_id: Option<String>) -> Option<Session> {
    if known.is_some() {
        return known;
    }
    let id = session_id?;
    state
        .directory()
        .resolve_session(&SessionId::new(id))
        .await
        .filter(|s| !s.is_expired())
}

/// Require a valid `X-CSRF-Token` on every state-changing request.
pub async fn prevent_csrf(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_safe(request.method()) {
        return next.run(request).await;
    }

    let Some(token) = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
    else {
        return deny(&request, "missing token");
    };

    let known = RequestContext::get(request.extensions()).and_then(|c| c.session.clone());
    let jar = cookies::jar(request.headers());
    let session_id = cookies::value(&jar, cookies::SESSION_ID);

    if let Some(session) = session_for(&state, known, session_id).await {
        if state.directory().is_valid_csrf(&token, &session).await {
            return next.run(request).await;
        }
    }

    let double_submit = cookies::value(&jar, cookies::CSRF_TOKEN)
        .is_some_and(|cookie| bool::from(cookie.as_bytes().ct_eq(token.as_bytes())));
    if double_submit {
        return next.run(request).await;
    }

    deny(&request, "token mismatch")
}

fn deny(request: &Request, reason: &'static str) -> Response {
    tracing::warn!(
        reason,
        method = %request.method(),
        path = %request.uri().path(),
        request_id = RequestContext::get(request.extensions()).and_then(RequestContext::request_id_str),
        "CSRF check failed"
    );
    GatewayError::Csrf(reason.to_string()).into_response()
}

/// Give browsers without a `csrf_token` cookie a fresh one.
pub async fn issue_csrf_token(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let jar = cookies::jar(request.headers());
    let existing = cookies::value(&jar, cookies::CSRF_TOKEN);
    let token = existing
        .clone()
        .map_or_else(CsrfToken::generate, CsrfToken);
    request.extensions_mut().insert(token.clone());

    let mut response = next.run(request).await;

    if existing.is_none() {
        let cookie = Cookie::build((cookies::CSRF_TOKEN, token.0))
            .path("/")
            .same_site(SameSite::Strict)
            .http_only(false)
            .secure(state.config().cookies.strict_https)
            .build();
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}
