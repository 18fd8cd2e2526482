//! Rate limiting middleware using governor.
//!
//! One keyed limiter lives in [`AppState`]. Clients are keyed by the
//! authenticated user when `key_by_user` is set, or otherwise by their real
//! IP, read from Cloudflare and Fly.io proxy headers before falling back to
//! the socket address. Clients whose address cannot be determined share a
//! single bucket.
//!
//! The limiter runs before the per-route authentication stages, so it
//! recognizes the session cookies itself when keying by user.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    DefaultKeyedRateLimiter, Quota,
    clock::{Clock, DefaultClock},
};
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::middleware::auth::recognize;
use crate::state::AppState;

/// Identity a bucket is kept for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Client IP address.
    Ip(IpAddr),
    /// Authenticated role name.
    User(String),
    /// Client whose address could not be determined.
    Unknown,
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "ip:{ip}"),
            Self::User(name) => write!(f, "user:{name}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Parse a single IP out of a header value.
fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Real client IP, checking Cloudflare's `CF-Connecting-IP` first, then the
/// standard proxy headers, then the socket the connection came from.
#[must_use]
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    let headers = request.headers();

    // Try CF-Connecting-IP first (Cloudflare's real client IP)
    if let Some(ip) = header_ip(headers, "cf-connecting-ip") {
        return Some(ip);
    }

    // Try X-Forwarded-For (first IP in the chain)
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    header_ip(headers, "x-real-ip")
        .or_else(|| header_ip(headers, "fly-client-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

/// Process-wide keyed rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<RateLimitKey>>,
    key_by_user: bool,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("buckets", &self.limiter.len())
            .field("key_by_user", &self.key_by_user)
            .finish()
    }
}

impl RateLimiter {
    /// Build a limiter replenishing `per_minute` cells with room for `burst`.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        let quota = Quota::per_minute(config.per_minute).allow_burst(config.burst);
        Self {
            limiter: Arc::new(governor::RateLimiter::keyed(quota)),
            key_by_user: config.key_by_user,
        }
    }

    /// Whether authenticated clients get their own bucket.
    #[must_use]
    pub const fn keys_by_user(&self) -> bool {
        self.key_by_user
    }

    /// Pick the bucket key for `request`, sent by the authenticated `user` if any.
    #[must_use]
    pub fn key_for(&self, user: Option<&str>, request: &Request) -> RateLimitKey {
        if self.key_by_user {
            if let Some(name) = user {
                return RateLimitKey::User(name.to_string());
            }
        }
        client_ip(request).map_or(RateLimitKey::Unknown, RateLimitKey::Ip)
    }

    /// Take one cell from `key`'s bucket.
    ///
    /// # Errors
    ///
    /// Returns how long the client must wait when the bucket is empty.
    pub fn check(&self, key: &RateLimitKey) -> Result<(), Duration> {
        self.limiter
            .check_key(key)
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }

    /// Number of buckets currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    /// Whether no bucket is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }

    /// Drop buckets that have fully refilled.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Prune idle buckets every `every` on a background task.
    #[must_use]
    pub fn spawn_pruner(&self, every: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.prune();
                tracing::debug!(buckets = limiter.len(), "Pruned idle rate limit buckets");
            }
        })
    }
}

/// Role behind `request`: the user in context, else a recognized session.
async fn session_user(state: &AppState, request: Request) -> (Request, Option<String>) {
    let known = RequestContext::get(request.extensions())
        .and_then(RequestContext::username_str)
        .map(str::to_owned);
    if known.is_some() {
        return (request, known);
    }

    let (parts, body) = request.into_parts();
    let user = recognize(state, &parts)
        .await
        .ok()
        .map(|(user, _)| user.username.to_string());
    (Request::from_parts(parts, body), user)
}

/// Admit the request if its client still has budget, else `429` + `Retry-After`.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (request, user) = if state.rate_limiter().keys_by_user() {
        session_user(&state, request).await
    } else {
        (request, None)
    };
    let limiter = state.rate_limiter();
    let key = limiter.key_for(user.as_deref(), &request);

    match limiter.check(&key) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(
                client = %key,
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                request_id = RequestContext::get(request.extensions()).and_then(RequestContext::request_id_str),
                "Rate limit exceeded"
            );
            GatewayError::RateLimited { retry_after }.into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use axum::{
        Router,
        body::Body,
        http::{StatusCode, header},
        middleware::from_fn_with_state,
        routing::get,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use lumen_core::{Session, SessionId, Username};
    use tower::ServiceExt;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::directory::{Directory, StaticDirectory};

    fn config(burst: u32, key_by_user: bool) -> RateLimitConfig {
        RateLimitConfig {
            per_minute: NonZeroU32::new(1).unwrap(),
            burst: NonZeroU32::new(burst).unwrap(),
            key_by_user,
        }
    }

    fn app_with(store: Arc<StaticDirectory>, burst: u32, key_by_user: bool) -> Router {
        let mut gateway = GatewayConfig::default();
        gateway.rate_limit = config(burst, key_by_user);
        let directory = Directory::from_static(store, Duration::from_secs(60));
        let state = AppState::new(gateway, directory);
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(state, rate_limit))
    }

    fn app(burst: u32) -> Router {
        app_with(Arc::new(StaticDirectory::new()), burst, false)
    }

    fn from_ip(ip: &str) -> Request {
        Request::builder()
            .uri("/")
            .header("x-forwarded-for", format!("{ip}, 10.0.0.1"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_burst_then_429_with_retry_after() {
        let app = app(3);
        for _ in 0..3 {
            let response = app.clone().oneshot(from_ip("203.0.113.7")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(from_ip("203.0.113.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry));

        let other = app.oneshot(from_ip("198.51.100.2")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[test]
    fn test_client_ip_header_precedence() {
        let request = Request::builder()
            .header("cf-connecting-ip", "1.1.1.1")
            .header("x-forwarded-for", "2.2.2.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some("1.1.1.1".parse().unwrap()));

        let request = Request::builder()
            .header("x-real-ip", " 3.3.3.3 ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some("3.3.3.3".parse().unwrap()));

        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_ip(&request), Some("192.0.2.1".parse().unwrap()));

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request), None);
    }

    #[test]
    fn test_key_by_user_prefers_user() {
        let request = from_ip("203.0.113.9");
        let ip = RateLimitKey::Ip("203.0.113.9".parse().unwrap());

        let limiter = RateLimiter::new(&config(5, true));
        assert_eq!(limiter.key_for(None, &request), ip);
        assert_eq!(limiter.key_for(Some("alice"), &request), RateLimitKey::User("alice".into()));

        let by_ip = RateLimiter::new(&config(5, false));
        assert_eq!(by_ip.key_for(Some("alice"), &request), ip);
    }

    #[tokio::test]
    async fn test_users_behind_one_ip_get_own_buckets() {
        let store = Arc::new(StaticDirectory::new());
        for (id, name) in [("s-alice", "alice"), ("s-bob", "bob")] {
            store
                .insert_session(Session {
                    id: SessionId::new(id),
                    username: Username::parse(name).unwrap(),
                    expires_at: Utc::now() + ChronoDuration::hours(1),
                    csrf_token: None,
                })
                .await;
        }
        let app = app_with(store, 1, true);
        let signed_in = |id: &str, name: &str| {
            let mut request = from_ip("203.0.113.20");
            request.headers_mut().insert(
                header::COOKIE,
                format!("session_id={id}; username={name}").parse().unwrap(),
            );
            request
        };

        let alice = app.clone().oneshot(signed_in("s-alice", "alice")).await.unwrap();
        assert_eq!(alice.status(), StatusCode::OK);
        let bob = app.clone().oneshot(signed_in("s-bob", "bob")).await.unwrap();
        assert_eq!(bob.status(), StatusCode::OK);

        let again = app.clone().oneshot(signed_in("s-alice", "alice")).await.unwrap();
        assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);

        // A forged username cookie does not buy a fresh bucket.
        let anonymous = app.clone().oneshot(from_ip("203.0.113.20")).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::OK);
        let forged = app.oneshot(signed_in("s-alice", "mallory")).await.unwrap();
        assert_eq!(forged.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_unknown_clients_share_a_bucket() {
        let limiter = RateLimiter::new(&config(1, false));
        let request = Request::builder().body(Body::empty()).unwrap();
        let key = limiter.key_for(None, &request);
        assert_eq!(key, RateLimitKey::Unknown);
        assert!(limiter.check(&key).is_ok());
        assert!(limiter.check(&RateLimitKey::Unknown).is_err());
    }

    #[test]
    fn test_prune_keeps_limiter_usable() {
        let limiter = RateLimiter::new(&config(2, false));
        let key = RateLimitKey::Ip("192.0.2.10".parse().unwrap());
        assert!(limiter.check(&key).is_ok());
        assert_eq!(limiter.len(), 1);
        limiter.prune();
        assert!(limiter.check(&key).is_ok());
    }
}
