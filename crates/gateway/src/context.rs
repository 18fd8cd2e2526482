//! Per-request context shared between wrappers and handlers.
//!
//! The context lives in the request extensions as a single [`RequestContext`]
//! value. Wrappers only ever fill empty slots; nothing removes a slot once an
//! upstream wrapper has written it.
//!
//! Extensions travel downstream by value, so an outer wrapper cannot see what
//! inner wrappers added. A wrapper that needs the latest context after the
//! inner stages ran (panic recovery) installs a [`ContextTrail`], which
//! [`RequestContext::update`] keeps current.

use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{FromRequestParts, Request},
    http::{Extensions, request::Parts},
};
use lumen_core::{DatabaseMetadata, RequestId, RoleMetadata, Session, TransactionState, User};

use crate::error::GatewayError;

/// Values accumulated by the pipeline for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Stable request identifier.
    pub request_id: Option<RequestId>,
    /// Authenticated (or cookie-asserted) user.
    pub user: Option<User>,
    /// Resolved browser session.
    pub session: Option<Session>,
    /// Transaction the browser has open.
    pub transaction: Option<TransactionState>,
    /// Grants of the current user.
    pub permissions: Option<Arc<RoleMetadata>>,
    /// Metadata of the database the session browses.
    pub metadata: Option<Arc<DatabaseMetadata>>,
    /// Normalized SQL the request asks to run.
    pub query: Option<String>,
}

impl RequestContext {
    /// Borrow the context stored in `extensions`, if any wrapper created it.
    #[must_use]
    pub fn get(extensions: &Extensions) -> Option<&Self> {
        extensions.get::<Self>()
    }

    /// Snapshot of the context stored in `extensions` (empty if none).
    #[must_use]
    pub fn snapshot(extensions: &Extensions) -> Self {
        extensions.get::<Self>().cloned().unwrap_or_default()
    }

    /// Apply `f` to the request's context, creating it when absent.
    pub fn update(request: &mut Request, f: impl FnOnce(&mut Self)) {
        let extensions = request.extensions_mut();
        let mut context = extensions.remove::<Self>().unwrap_or_default();
        f(&mut context);
        if let Some(trail) = extensions.get::<ContextTrail>() {
            trail.record(&context);
        }
        extensions.insert(context);
    }

    /// Request ID as a string slice, for log fields.
    #[must_use]
    pub fn request_id_str(&self) -> Option<&str> {
        self.request_id.as_ref().map(RequestId::as_str)
    }

    /// Role name of the current user, for log fields.
    #[must_use]
    pub fn username_str(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    /// Whether both a user and a session are present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.session.is_some()
    }
}

/// Latest context seen by inner wrappers, shared with the wrapper that
/// installed it.
#[derive(Debug, Clone, Default)]
pub struct ContextTrail(Arc<Mutex<RequestContext>>);

impl ContextTrail {
    /// Install a trail on `request`, seeded with its current context.
    pub fn install(request: &mut Request) -> Self {
        let seed = RequestContext::snapshot(request.extensions());
        let trail = Self(Arc::new(Mutex::new(seed)));
        request.extensions_mut().insert(trail.clone());
        trail
    }

    fn record(&self, context: &RequestContext) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = context.clone();
    }

    /// The most recent context written downstream.
    #[must_use]
    pub fn latest(&self) -> RequestContext {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Request ID of `request`, if stamped.
#[must_use]
pub fn request_id_of(request: &Request) -> Option<RequestId> {
    RequestContext::get(request.extensions()).and_then(|c| c.request_id.clone())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::snapshot(&parts.extensions))
    }
}

/// Extractor that requires an authenticated user in context.
///
/// Use behind `authenticate` or `require_auth`; rejects with 401 otherwise.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
///     format!("connected as {}", user.username)
/// }
/// ```
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        RequestContext::get(&parts.extensions)
            .and_then(|c| c.user.clone())
            .map(Self)
            .ok_or_else(|| GatewayError::Unauthenticated("no user in request context".into()))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `CurrentUser`, this does not reject the request when nobody is logged in.
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            RequestContext::get(&parts.extensions).and_then(|c| c.user.clone()),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use lumen_core::Username;

    use super::*;

    #[test]
    fn test_update_creates_and_preserves() {
        let mut request = Request::new(Body::empty());
        RequestContext::update(&mut request, |c| {
            c.request_id = Some(RequestId::new("r-1"));
        });
        RequestContext::update(&mut request, |c| {
            c.user = Some(User::new(Username::parse("alice").unwrap()));
        });

        let context = RequestContext::get(request.extensions()).unwrap();
        assert_eq!(context.request_id_str(), Some("r-1"));
        assert_eq!(context.username_str(), Some("alice"));
    }

    #[test]
    fn test_snapshot_of_empty_request() {
        let request = Request::new(Body::empty());
        let context = RequestContext::snapshot(request.extensions());
        assert!(context.request_id.is_none());
        assert!(!context.is_authenticated());
    }

    #[test]
    fn test_trail_follows_downstream_updates() {
        let mut request = Request::new(Body::empty());
        RequestContext::update(&mut request, |c| c.request_id = Some(RequestId::new("r-2")));
        let trail = ContextTrail::install(&mut request);
        assert_eq!(trail.latest().request_id_str(), Some("r-2"));
        assert!(trail.latest().user.is_none());

        RequestContext::update(&mut request, |c| {
            c.user = Some(User::new(Username::parse("alice").unwrap()));
            c.query = Some("SELECT 1".to_string());
        });

        let latest = trail.latest();
        assert_eq!(latest.request_id_str(), Some("r-2"));
        assert_eq!(latest.username_str(), Some("alice"));
        assert_eq!(latest.query.as_deref(), Some("SELECT 1"));
    }
}
