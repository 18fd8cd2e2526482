//! Pipeline assembly.
//!
//! axum runs the last-added layer first, so each function below adds its
//! wrappers innermost-first. Route-scoped stages compose from the inside out:
//!
//! ```rust,ignore
//! let rows = Router::new().route("/api/rows", any(rows));
//! let rows = pipeline::guard(rows, Some(Privilege::Select));
//! let rows = pipeline::protect(rows, &state);
//! let rows = pipeline::allow_methods(rows, [Method::GET, Method::POST]);
//! let app = pipeline::apply(Router::new().merge(rows), &state);
//! ```

use axum::{Router, http::Method, middleware::{from_fn, from_fn_with_state}};
use lumen_core::Privilege;

use crate::middleware::{
    AllowedMethods, authenticate, compression_layer, content_negotiation, cors_layer,
    default_headers, enforce_same_site_cookie, handle_errors, inject_metadata, inject_session,
    inject_transaction, inject_user, inject_user_permissions, issue_csrf_token,
    log_query_execution, log_request, log_security_events, log_transaction_events,
    optional_auth, prevent_csrf, rate_limit, recover_from_panic, request_id_middleware,
    require_auth, require_database_access, require_delete_permission, require_insert_permission,
    require_select_permission, require_table_access, require_update_permission,
    require_https_for_cookies, security_headers_middleware, validate_cookie_integrity,
    validate_http_method, validate_query_params, validate_request_body, validate_sql_query,
    validate_where_clause,
};
use crate::state::AppState;

/// Wrap `router` in the process-wide stages: request ID through CSRF.
pub fn apply<S>(router: Router<S>, state: &AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let config = state.config();
    router
        .layer(from_fn_with_state(state.clone(), issue_csrf_token))
        .layer(from_fn_with_state(state.clone(), prevent_csrf))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(from_fn_with_state(state.clone(), validate_cookie_integrity))
        .layer(from_fn_with_state(state.clone(), enforce_same_site_cookie))
        .layer(from_fn_with_state(state.clone(), require_https_for_cookies))
        .layer(from_fn_with_state(state.clone(), content_negotiation))
        .layer(compression_layer(config.compression_threshold))
        .layer(cors_layer(&config.cors))
        .layer(from_fn(security_headers_middleware))
        .layer(default_headers(&config.default_headers))
        .layer(from_fn(log_request))
        .layer(from_fn(handle_errors))
        .layer(from_fn(recover_from_panic))
        .layer(from_fn(request_id_middleware))
}

/// Restrict `router` to `methods`, answering `405` otherwise.
pub fn allow_methods<S>(router: Router<S>, methods: impl IntoIterator<Item = Method>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(from_fn_with_state(AllowedMethods::new(methods), validate_http_method))
}

fn inject<S>(router: Router<S>, state: &AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(from_fn_with_state(state.clone(), inject_metadata))
        .layer(from_fn(inject_transaction))
        .layer(from_fn_with_state(state.clone(), inject_user_permissions))
        .layer(from_fn_with_state(state.clone(), inject_session))
        .layer(from_fn(inject_user))
}

/// Authenticated stages: authentication, context injection and input validation.
pub fn protect<S>(router: Router<S>, state: &AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = router
        .layer(from_fn_with_state(state.clone(), validate_sql_query))
        .layer(from_fn(validate_where_clause))
        .layer(from_fn_with_state(state.clone(), validate_request_body))
        .layer(from_fn(validate_query_params));
    inject(router, state)
        .layer(from_fn_with_state(state.clone(), require_auth))
        .layer(from_fn_with_state(state.clone(), authenticate))
}

/// Stages for pages that work with or without a signed-in user.
pub fn public<S>(router: Router<S>, state: &AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    inject(router, state).layer(from_fn_with_state(state.clone(), optional_auth))
}

/// Security, query and transaction logging hooks.
pub fn observe<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(from_fn(log_transaction_events))
        .layer(from_fn(log_query_execution))
        .layer(from_fn(log_security_events))
}

/// Authorization gates for a table route, then the logging hooks.
///
/// Database and table access are always required; `privilege` adds the
/// per-verb check.
pub fn guard<S>(router: Router<S>, privilege: Option<Privilege>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = observe(router);
    let router = match privilege {
        None => router,
        Some(Privilege::Select) => router.layer(from_fn(require_select_permission)),
        Some(Privilege::Insert) => router.layer(from_fn(require_insert_permission)),
        Some(Privilege::Update) => router.layer(from_fn(require_update_permission)),
        Some(Privilege::Delete) => router.layer(from_fn(require_delete_permission)),
    };
    router
        .layer(from_fn(require_table_access))
        .layer(from_fn(require_database_access))
}
