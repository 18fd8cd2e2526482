//! Context injectors.
//!
//! Each injector fills one [`RequestContext`] slot from cookies or from a
//! slot an earlier injector filled. They never reject a request and never
//! overwrite a slot that is already set; collaborator failures leave the
//! slot empty (the directory logs them).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use lumen_core::{SessionId, TransactionId, TransactionState, User, Username};

use crate::context::RequestContext;
use crate::cookies;
use crate::state::AppState;

/// Interpret the `transaction_active` cookie. Absent means inactive.
fn parse_active(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Put the user named by the `username` cookie into context.
///
/// The name is not verified against a session; pair with `authenticate`
/// when the identity must be trusted.
pub async fn inject_user(mut request: Request, next: Next) -> Response {
    let has_user = RequestContext::get(request.extensions()).is_some_and(|c| c.user.is_some());
    if !has_user {
        let jar = cookies::jar(request.headers());
        let user = cookies::value(&jar, cookies::USERNAME)
            .and_then(|name| Username::parse(&name).ok())
            .map(User::new);
        if let Some(user) = user {
            RequestContext::update(&mut request, |c| c.user = Some(user));
        }
    }
    next.run(request).await
}

/// Put the live session named by the `session_id` cookie into context.
pub async fn inject_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let has_session = RequestContext::get(request.extensions()).is_some_and(|c| c.session.is_some());
    if !has_session {
        let jar = cookies::jar(request.headers());
        if let Some(id) = cookies::value(&jar, cookies::SESSION_ID) {
            let session = state
                .directory()
                .resolve_session(&SessionId::new(id))
                .await
                .filter(|s| !s.is_expired());
            if let Some(session) = session {
                RequestContext::update(&mut request, |c| c.session = Some(session));
            }
        }
    }
    next.run(request).await
}

/// Put the transaction named by the `transaction_id` cookie into context.
pub async fn inject_transaction(mut request: Request, next: Next) -> Response {
    let has_transaction =
        RequestContext::get(request.extensions()).is_some_and(|c| c.transaction.is_some());
    if !has_transaction {
        let jar = cookies::jar(request.headers());
        if let Some(id) = cookies::value(&jar, cookies::TRANSACTION_ID) {
            let active = parse_active(cookies::value(&jar, cookies::TRANSACTION_ACTIVE).as_deref());
            RequestContext::update(&mut request, |c| {
                c.transaction = Some(TransactionState {
                    id: TransactionId::new(id),
                    active,
                });
            });
        }
    }
    next.run(request).await
}

/// Load the current user's grants into context.
pub async fn inject_user_permissions(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = RequestContext::get(request.extensions());
    let username = context
        .filter(|c| c.permissions.is_none())
        .and_then(|c| c.user.as_ref())
        .map(|u| u.username.clone());

    if let Some(username) = username {
        if let Some(permissions) = state.directory().permissions_for(&username).await {
            RequestContext::update(&mut request, |c| c.permissions = Some(permissions));
        }
    }
    next.run(request).await
}

/// Load metadata for the current session's database into context.
pub async fn inject_metadata(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session = RequestContext::get(request.extensions())
        .filter(|c| c.metadata.is_none())
        .and_then(|c| c.session.clone());

    if let Some(session) = session {
        if let Some(metadata) = state.directory().metadata_for(&session).await {
            RequestContext::update(&mut request, |c| c.metadata = Some(metadata));
        }
    }
    next.run(request).await
}
