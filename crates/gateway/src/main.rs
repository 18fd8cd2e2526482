//! Lumen-PG gateway - development server for the middleware pipeline.
//!
//! Serves a health check plus a few introspection endpoints behind the full
//! pipeline, with collaborators backed by a [`StaticDirectory`] seeded from
//! `LUMEN_DIRECTORY_FILE`. Hosts embedding the gateway use the library and
//! `pipeline` functions directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Extension, Json, Router,
    extract::Request,
    http::Method,
    routing::{any, get},
};
use lumen_core::{Privilege, TableRef};
use lumen_gateway::{
    AppState, CurrentUser, Directory, GatewayConfig, RequestContext, StaticDirectory,
    config::LogFormat, middleware::NegotiatedType, pipeline, query,
};
use sentry::integrations::tracing as sentry_tracing;
use serde_json::{Value, json};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// How often idle rate-limit buckets are dropped.
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &GatewayConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lumen_gateway=info,tower_http=debug".into());

    let fmt_layer = match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

async fn load_directory(config: &GatewayConfig) -> Arc<StaticDirectory> {
    let Some(path) = config.directory_file.as_deref() else {
        tracing::warn!("LUMEN_DIRECTORY_FILE not set, starting with an empty directory");
        return Arc::new(StaticDirectory::new());
    };
    let directory = StaticDirectory::load(path)
        .await
        .expect("Failed to load directory seed");
    tracing::info!(path = %path.display(), "Directory seed loaded");
    Arc::new(directory)
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = GatewayConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    let store = load_directory(&config).await;
    let directory = Directory::from_static(store, config.cache_ttl);
    let addr = config.socket_addr();
    let state = AppState::new(config, directory);

    let pruner = state.rate_limiter().spawn_pruner(RATE_LIMIT_PRUNE_INTERVAL);

    let app = Router::new()
        .route("/health", get(health))
        .merge(pipeline::apply(routes(&state), &state))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    tracing::info!("gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    pruner.abort();
}

/// Routes served behind the pipeline.
fn routes(state: &AppState) -> Router {
    let whoami = Router::new().route("/api/whoami", get(whoami));
    let whoami = pipeline::protect(pipeline::observe(whoami), state);

    let table = Router::new().route("/api/table", any(table));
    let table = pipeline::protect(pipeline::guard(table, Some(Privilege::Select)), state);
    let table = pipeline::allow_methods(table, [Method::GET, Method::HEAD]);

    Router::new().merge(whoami).merge(table)
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// The signed-in role and what the pipeline resolved for it.
async fn whoami(
    CurrentUser(user): CurrentUser,
    context: RequestContext,
    negotiated: Option<Extension<NegotiatedType>>,
) -> Json<Value> {
    Json(json!({
        "username": user.username,
        "request_id": context.request_id_str(),
        "session_expires_at": context.session.as_ref().map(|s| s.expires_at),
        "transaction": context.transaction,
        "databases": context.permissions.as_ref().map(|p| &p.accessible_databases),
        "schemas": context.metadata.as_ref().map(|m| m.schemas.len()),
        "content_type": negotiated.map(|Extension(t)| t.0),
    }))
}

/// Grants the signed-in role holds on the requested table.
async fn table(context: RequestContext, request: Request) -> Json<Value> {
    let uri = request.uri();
    let (database, schema, name) = (
        query::param(uri, "database").unwrap_or_default(),
        query::param(uri, "schema").unwrap_or_default(),
        query::param(uri, "table").unwrap_or_default(),
    );
    let target = TableRef {
        database: &database,
        schema: &schema,
        name: &name,
    };
    let grant = context.permissions.as_ref().and_then(|p| p.table(target).cloned());
    Json(json!({
        "username": context.username_str(),
        "grant": grant,
    }))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
