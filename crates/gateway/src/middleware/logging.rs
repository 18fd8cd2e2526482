//! Structured logging hooks.
//!
//! Every hook here is pass-through: it reads the request context when one
//! exists, emits `tracing` events and returns the downstream response as-is.

use std::time::Instant;

use axum::{
    extract::Request,
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::context::RequestContext;
use crate::middleware::rate_limit::client_ip;

/// Longest SQL text copied into a log event.
const MAX_LOGGED_QUERY: usize = 512;

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Wrap the request in a span carrying the request ID and log its outcome.
pub async fn log_request(request: Request, next: Next) -> Response {
    let context = RequestContext::snapshot(request.extensions());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let span = tracing::info_span!(
        "request",
        method = %method,
        path = %path,
        request_id = context.request_id_str().unwrap_or_default(),
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let latency_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    span.in_scope(|| {
        if response.status().is_server_error() {
            tracing::error!(status, latency_ms, "Request failed");
        } else {
            tracing::info!(status, latency_ms, "Request completed");
        }
    });
    response
}

/// Log the SQL recorded by query validation together with its outcome.
pub async fn log_query_execution(request: Request, next: Next) -> Response {
    let context = RequestContext::snapshot(request.extensions());
    let Some(query) = context.query.as_deref() else {
        return next.run(request).await;
    };
    let query = truncate(query, MAX_LOGGED_QUERY).to_owned();

    let start = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        request_id = context.request_id_str(),
        user = context.username_str(),
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        query = %query,
        "Query executed"
    );
    response
}

const fn is_security_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
    )
}

/// Log authentication failures, denials, throttling and other client errors.
pub async fn log_security_events(request: Request, next: Next) -> Response {
    let context = RequestContext::snapshot(request.extensions());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let ip = client_ip(&request).map(|ip| ip.to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let response = next.run(request).await;
    let status = response.status();
    if is_security_status(status) {
        tracing::warn!(
            request_id = context.request_id_str(),
            user = context.username_str(),
            ip = ip.as_deref(),
            user_agent = user_agent.as_deref(),
            %method,
            %path,
            status = status.as_u16(),
            "Security event"
        );
    } else if status.is_client_error() {
        tracing::debug!(
            request_id = context.request_id_str(),
            %method,
            %path,
            status = status.as_u16(),
            "Client error"
        );
    }
    response
}

/// Log requests made inside a tracked transaction.
pub async fn log_transaction_events(request: Request, next: Next) -> Response {
    let context = RequestContext::snapshot(request.extensions());
    let Some(transaction) = context.transaction.clone() else {
        return next.run(request).await;
    };
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    tracing::info!(
        request_id = context.request_id_str(),
        user = context.username_str(),
        transaction_id = %transaction.id,
        active = transaction.active,
        %method,
        %path,
        status = response.status().as_u16(),
        "Transaction request"
    );
    response
}
