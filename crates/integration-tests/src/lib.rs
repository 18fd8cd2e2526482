//! Conformance harness for the Lumen-PG gateway.
//!
//! Builds the full pipeline over a [`StaticDirectory`] fixture and drives it
//! in-process with `tower::ServiceExt::oneshot`; no sockets, no database.
//!
//! # Fixtures
//!
//! - `alice` (session [`ALICE_SESSION`]) may connect to `testdb`, holds
//!   SELECT + INSERT on `testdb.public.users` and SELECT on
//!   `testdb.public.orders`. Her session carries [`ALICE_SESSION_CSRF`].
//! - `bob` (session [`BOB_SESSION`]) has a live session but no grants.
//! - [`EXPIRED_SESSION`] belongs to `alice` and expired an hour ago.
//!
//! # Routes
//!
//! | Path | Stages |
//! |---|---|
//! | `/api/whoami` | protect, logging hooks |
//! | `/api/locked` | protect, logging hooks; the handler answers `403` |
//! | `/api/rows` | GET/POST, protect, SELECT gate |
//! | `/api/rows/insert` | POST, protect, INSERT gate |
//! | `/api/rows/delete` | POST, protect, DELETE gate |
//! | `/api/query` | POST, protect, logging hooks; echoes the recorded query |
//! | `/console` | protect (redirects to login by default) |
//! | `/api/me`, `/api/echo`, `/api/cookie`, `/api/panic`, `/report` | optional auth |

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use lumen_core::{
    DatabaseMetadata, Privilege, RoleMetadata, SchemaInfo, Session, SessionId, TablePermission,
    Username,
};
use lumen_gateway::{
    AppState, CurrentUser, Directory, GatewayConfig, MaybeUser, RequestContext, StaticDirectory,
    cookies::{self, CookieSigner},
    directory::DirectorySeed,
    pipeline,
};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Signing key every harness instance uses.
pub const SIGNING_KEY: &str = "conformance-signing-key-0f3a9c2e7b51d84a";

/// Role with grants.
pub const ALICE: &str = "alice";
/// Alice's live session.
pub const ALICE_SESSION: &str = "sess-alice";
/// Token bound to Alice's session.
pub const ALICE_SESSION_CSRF: &str = "csrf-bound-to-alice";
/// Role without grants.
pub const BOB: &str = "bob";
/// Bob's live session.
pub const BOB_SESSION: &str = "sess-bob";
/// Alice's expired session.
pub const EXPIRED_SESSION: &str = "sess-expired";

/// Database Alice may use.
pub const DATABASE: &str = "testdb";
/// Schema of the fixture tables.
pub const SCHEMA: &str = "public";

/// Double-submit token the request builder sends with [`TestRequest::with_csrf`].
pub const DOUBLE_SUBMIT_TOKEN: &str = "double-submit-token";

/// Body of `/report`, a `text/plain` payload above the compression threshold.
#[must_use]
pub fn report_body() -> String {
    "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ\n"
        .repeat(21)
        .chars()
        .take(1300)
        .collect()
}

fn username(name: &str) -> Username {
    Username::parse(name).expect("fixture username is valid")
}

fn table(name: &str, select: bool, insert: bool) -> TablePermission {
    TablePermission {
        database: DATABASE.to_string(),
        schema: SCHEMA.to_string(),
        name: name.to_string(),
        has_select: select,
        has_insert: insert,
        has_update: false,
        has_delete: false,
    }
}

/// Sessions, grants and metadata behind the fixtures.
#[must_use]
pub fn seed() -> DirectorySeed {
    let now = Utc::now();
    let sessions = vec![
        Session {
            id: SessionId::new(ALICE_SESSION),
            username: username(ALICE),
            expires_at: now + Duration::hours(1),
            csrf_token: Some(ALICE_SESSION_CSRF.to_string()),
        },
        Session {
            id: SessionId::new(BOB_SESSION),
            username: username(BOB),
            expires_at: now + Duration::hours(1),
            csrf_token: None,
        },
        Session {
            id: SessionId::new(EXPIRED_SESSION),
            username: username(ALICE),
            expires_at: now - Duration::hours(1),
            csrf_token: None,
        },
    ];

    let roles = vec![RoleMetadata {
        name: ALICE.to_string(),
        accessible_databases: [DATABASE.to_string()].into_iter().collect(),
        accessible_tables: vec![table("users", true, true), table("orders", true, false)],
    }];

    let metadata = [(
        ALICE_SESSION.to_string(),
        DatabaseMetadata {
            database: DATABASE.to_string(),
            schemas: vec![SchemaInfo {
                name: SCHEMA.to_string(),
                tables: vec!["users".to_string(), "orders".to_string()],
            }],
        },
    )]
    .into_iter()
    .collect();

    DirectorySeed {
        sessions,
        roles,
        metadata,
    }
}

// =============================================================================
// Routes
// =============================================================================

async fn whoami(CurrentUser(user): CurrentUser, context: RequestContext) -> Json<Value> {
    Json(json!({
        "username": user.username,
        "request_id": context.request_id_str(),
        "session": context.session.as_ref().map(|s| s.id.as_str().to_string()),
        "transaction": context.transaction,
        "has_permissions": context.permissions.is_some(),
        "has_metadata": context.metadata.is_some(),
    }))
}

async fn rows(context: RequestContext) -> Json<Value> {
    Json(json!({ "rows": [], "user": context.username_str() }))
}

async fn recorded_query(context: RequestContext) -> Json<Value> {
    Json(json!({ "query": context.query }))
}

async fn locked() -> (StatusCode, &'static str) {
    (StatusCode::FORBIDDEN, "permission denied for table audit_log")
}

async fn me(MaybeUser(user): MaybeUser) -> String {
    user.map_or_else(|| "anonymous".to_string(), |u| u.username.to_string())
}

async fn echo(body: String) -> String {
    body
}

async fn set_plain_cookie() -> ([(header::HeaderName, &'static str); 1], &'static str) {
    ([(header::SET_COOKIE, "theme=dark; Path=/")], "ok")
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

async fn report() -> ([(header::HeaderName, &'static str); 1], String) {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], report_body())
}

/// The harness router, wrapped in the full pipeline.
pub fn router(state: &AppState) -> Router {
    let whoami = Router::new()
        .route("/api/whoami", get(whoami))
        .route("/api/locked", get(locked));
    let whoami = pipeline::protect(pipeline::observe(whoami), state);

    let select = Router::new().route("/api/rows", get(rows).post(rows));
    let select = pipeline::protect(pipeline::guard(select, Some(Privilege::Select)), state);
    let select = pipeline::allow_methods(select, [Method::GET, Method::POST]);

    let insert = Router::new().route("/api/rows/insert", post(rows));
    let insert = pipeline::protect(pipeline::guard(insert, Some(Privilege::Insert)), state);

    let delete = Router::new().route("/api/rows/delete", post(rows));
    let delete = pipeline::protect(pipeline::guard(delete, Some(Privilege::Delete)), state);

    let query = Router::new().route("/api/query", post(recorded_query));
    let query = pipeline::protect(pipeline::observe(query), state);

    let console = Router::new().route("/console", get(|| async { "console" }));
    let console = pipeline::protect(console, state);

    let open = Router::new()
        .route("/api/me", get(me))
        .route("/api/echo", post(echo))
        .route("/api/cookie", get(set_plain_cookie))
        .route("/api/panic", get(explode))
        .route("/report", get(report));
    let open = pipeline::public(open, state);

    let app = Router::new()
        .merge(whoami)
        .merge(select)
        .merge(insert)
        .merge(delete)
        .merge(query)
        .merge(console)
        .merge(open);
    pipeline::apply(app, state)
}

// =============================================================================
// Harness
// =============================================================================

/// A pipeline instance over fresh fixtures.
pub struct TestApp {
    /// Shared state (config, directory, signer, rate limiter).
    pub state: AppState,
    /// Backing store, for tests that change fixtures mid-run.
    pub store: Arc<StaticDirectory>,
    router: Router,
}

impl TestApp {
    /// Default configuration.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Configuration adjusted by `configure`.
    pub fn with_config(configure: impl FnOnce(&mut GatewayConfig)) -> Self {
        let mut config = GatewayConfig::default().with_signing_key(SIGNING_KEY);
        configure(&mut config);

        let store = Arc::new(StaticDirectory::from_seed(seed()));
        let directory = Directory::from_static(Arc::clone(&store), config.cache_ttl);
        let state = AppState::new(config, directory);
        let router = router(&state);
        Self {
            state,
            store,
            router,
        }
    }

    /// Signer matching the app's key.
    #[must_use]
    pub fn signer(&self) -> &CookieSigner {
        self.state.signer()
    }

    /// Run one request through the pipeline.
    pub async fn send(&self, request: TestRequest) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request.build())
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body")
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Request builder with cookie and body helpers.
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Body,
}

impl TestRequest {
    /// Request with `method` to `uri`.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Body::empty(),
        }
    }

    /// `GET uri`.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// `POST uri`.
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a cookie.
    #[must_use]
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a cookie and its signature companion.
    #[must_use]
    pub fn signed_cookie(self, signer: &CookieSigner, name: &str, value: &str) -> Self {
        let signature = signer.sign(name, value);
        self.cookie(name, value)
            .cookie(&cookies::signature_name(name), &signature)
    }

    /// Session cookies for `username` on `session`.
    #[must_use]
    pub fn session(self, username: &str, session: &str) -> Self {
        self.cookie(cookies::SESSION_ID, session)
            .cookie(cookies::USERNAME, username)
    }

    /// Alice's session cookies.
    #[must_use]
    pub fn as_alice(self) -> Self {
        self.session(ALICE, ALICE_SESSION)
    }

    /// Matching double-submit cookie and header.
    #[must_use]
    pub fn with_csrf(self) -> Self {
        self.cookie(cookies::CSRF_TOKEN, DOUBLE_SUBMIT_TOKEN)
            .header("x-csrf-token", DOUBLE_SUBMIT_TOKEN)
    }

    /// JSON body.
    #[must_use]
    pub fn json(self, value: &Value) -> Self {
        self.raw_body("application/json", value.to_string())
    }

    /// Form body.
    #[must_use]
    pub fn form(self, body: &str) -> Self {
        self.raw_body("application/x-www-form-urlencoded", body.to_string())
    }

    /// Body with an explicit content type.
    #[must_use]
    pub fn raw_body(mut self, content_type: &str, body: impl Into<Body>) -> Self {
        self.headers
            .push((header::CONTENT_TYPE.to_string(), content_type.to_string()));
        self.body = body.into();
        self
    }

    /// Finish into an HTTP request.
    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(n, v)| format!("{n}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(self.body).expect("Failed to build request")
    }
}

/// A fully buffered response.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw (possibly compressed) body.
    pub body: Vec<u8>,
}

impl TestResponse {
    /// A header as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every `Set-Cookie` value.
    #[must_use]
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v: &HeaderValue| v.to_str().ok())
            .map(str::to_owned)
            .collect()
    }

    /// Body as UTF-8 text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Response body is not JSON")
    }
}
