//! Session authentication middlewares.
//!
//! All three roles share one recognition step: the `session_id` and
//! `username` cookies must both be present, the session must resolve, must
//! not be expired, and must be bound to the cookie's username.
//!
//! - [`authenticate`] injects `user` + `session` or rejects.
//! - [`require_auth`] rejects the same way, reusing an identity already in
//!   context when `authenticate` ran upstream.
//! - [`optional_auth`] injects on success and never rejects.

use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lumen_core::{Session, SessionId, User, Username};

use crate::config::AuthFailureMode;
use crate::context::RequestContext;
use crate::cookies;
use crate::error::GatewayError;
use crate::state::AppState;

/// Why recognition failed. Logged, never sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `session_id` cookie.
    MissingSession,
    /// No `username` cookie.
    MissingUsername,
    /// `username` cookie is not a valid role name.
    InvalidUsername,
    /// Session unknown to the resolver (or resolver failed).
    UnknownSession,
    /// Session expired.
    Expired,
    /// Session is bound to a different user.
    UserMismatch,
}

impl AuthFailure {
    const fn as_str(self) -> &'static str {
        match self {
            Self::MissingSession => "missing session cookie",
            Self::MissingUsername => "missing username cookie",
            Self::InvalidUsername => "malformed username cookie",
            Self::UnknownSession => "unknown session",
            Self::Expired => "session expired",
            Self::UserMismatch => "session bound to another user",
        }
    }
}

/// Recognize the session carried by the request's cookies.
///
/// # Errors
///
/// Returns the reason recognition failed.
pub async fn recognize(state: &AppState, parts: &Parts) -> Result<(User, Session), AuthFailure> {
    let jar = cookies::jar(&parts.headers);
    let session_id = cookies::value(&jar, cookies::SESSION_ID).ok_or(AuthFailure::MissingSession)?;
    let username = cookies::value(&jar, cookies::USERNAME).ok_or(AuthFailure::MissingUsername)?;
    let username = Username::parse(&username).map_err(|_| AuthFailure::InvalidUsername)?;

    let session = state
        .directory()
        .resolve_session(&SessionId::new(session_id))
        .await
        .ok_or(AuthFailure::UnknownSession)?;

    if session.is_expired() {
        return Err(AuthFailure::Expired);
    }
    if !session.is_bound_to(&username) {
        return Err(AuthFailure::UserMismatch);
    }

    Ok((User::new(username), session))
}

/// Build the rejection configured for this deployment.
fn reject(state: &AppState, request: &Request, failure: AuthFailure) -> Response {
    let auth = &state.config().auth;
    let redirect = match auth.failure_mode {
        AuthFailureMode::Unauthorized => false,
        AuthFailureMode::Redirect => true,
        AuthFailureMode::ByPath => !request.uri().path().starts_with("/api/"),
    };

    let request_id = RequestContext::get(request.extensions()).and_then(|c| c.request_id_str());
    tracing::info!(
        reason = failure.as_str(),
        path = %request.uri().path(),
        request_id,
        "Authentication failed"
    );

    if redirect {
        GatewayError::LoginRequired {
            location: auth.login_path.clone(),
        }
        .into_response()
    } else {
        GatewayError::Unauthenticated(failure.as_str().to_string()).into_response()
    }
}

/// Run recognition on `request` and, on success, record the identity.
async fn recognize_into(state: &AppState, request: Request) -> (Request, Result<(), AuthFailure>) {
    let (parts, body) = request.into_parts();
    let outcome = recognize(state, &parts).await;
    let mut request = Request::from_parts(parts, body);

    let result = outcome.map(|(user, session)| {
        RequestContext::update(&mut request, |c| {
            c.user = Some(user);
            c.session = Some(session);
        });
    });
    (request, result)
}

/// Require a valid session; inject `user` and `session` into context.
pub async fn authenticate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match recognize_into(&state, request).await {
        (request, Ok(())) => next.run(request).await,
        (request, Err(failure)) => reject(&state, &request, failure),
    }
}

/// Require a valid session, reusing an identity `authenticate` already injected.
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let already = RequestContext::get(request.extensions()).is_some_and(RequestContext::is_authenticated);
    if already {
        return next.run(request).await;
    }
    authenticate(State(state), request, next).await
}

/// Inject `user` and `session` when the cookies are valid; never reject.
pub async fn optional_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (request, outcome) = recognize_into(&state, request).await;
    if let Err(failure) = outcome {
        if failure != AuthFailure::MissingSession {
            tracing::debug!(reason = failure.as_str(), "Optional authentication skipped");
        }
    }
    next.run(request).await
}
