//! Validation middlewares. The rules themselves live in [`crate::firewall`].

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::StreamExt;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::firewall::{self, ValidationError};
use crate::query;
use crate::state::AppState;

fn reject(request: &Request, error: &ValidationError) -> Response {
    tracing::warn!(
        reason = %error,
        path = %request.uri().path(),
        request_id = RequestContext::get(request.extensions()).and_then(RequestContext::request_id_str),
        "Request rejected by input validation"
    );
    GatewayError::Validation(error.to_string()).into_response()
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

/// Read the whole body, refusing more than `limit` bytes.
///
/// # Errors
///
/// Returns `PayloadTooLarge` past the limit and `Validation` when the body
/// stream fails.
pub async fn buffer_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > u64::try_from(limit).unwrap_or(u64::MAX)) {
        return Err(GatewayError::PayloadTooLarge { limit });
    }

    let mut stream = body.into_data_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GatewayError::Validation(format!("unreadable body: {e}")))?;
        if buffer.len() + chunk.len() > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

/// Check every query parameter name and value.
pub async fn validate_query_params(request: Request, next: Next) -> Response {
    let pairs = query::pairs(request.uri());
    let checked = firewall::check_query_params(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    match checked {
        Ok(()) => next.run(request).await,
        Err(e) => reject(&request, &e),
    }
}

/// Enforce the body size limit and check the body against its content type.
pub async fn validate_request_body(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let limit = state.config().max_body_bytes;
    let (parts, body) = request.into_parts();

    let bytes = match buffer_body(&parts.headers, body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, path = %parts.uri.path(), "Request body refused");
            return e.into_response();
        }
    };

    let checked = firewall::check_body(content_type(&parts.headers), &bytes);
    let request = Request::from_parts(parts, Body::from(bytes));
    match checked {
        Ok(()) => next.run(request).await,
        Err(e) => reject(&request, &e),
    }
}

/// Check the `where` query parameter, if any, as a filter fragment.
pub async fn validate_where_clause(request: Request, next: Next) -> Response {
    let Some(fragment) = query::param(request.uri(), "where") else {
        return next.run(request).await;
    };
    match firewall::check_where_clause(&fragment) {
        Ok(()) => next.run(request).await,
        Err(e) => reject(&request, &e),
    }
}

/// Pull the `query` field out of a JSON or form body.
fn extract_query(content_type: Option<&str>, body: &[u8]) -> Result<Option<String>, ValidationError> {
    if body.is_empty() {
        return Ok(None);
    }
    let essence = content_type.map(firewall::essence).unwrap_or_default();
    if firewall::is_json(&essence) {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| ValidationError::MalformedJson)?;
        Ok(value
            .get("query")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned))
    } else if firewall::is_form(&essence) {
        Ok(url::form_urlencoded::parse(body)
            .find(|(k, _)| k == "query")
            .map(|(_, v)| v.into_owned()))
    } else {
        Ok(None)
    }
}

/// Check the SQL submitted in the body's `query` field and record it in context.
pub async fn validate_sql_query(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let limit = state.config().max_body_bytes;
    let (parts, body) = request.into_parts();

    let bytes = match buffer_body(&parts.headers, body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => return e.into_response(),
    };

    let checked = extract_query(content_type(&parts.headers), &bytes)
        .and_then(|sql| sql.map(|sql| firewall::check_sql_query(&sql)).transpose());
    let mut request = Request::from_parts(parts, Body::from(bytes));

    match checked {
        Ok(Some(normalized)) => {
            RequestContext::update(&mut request, |c| c.query = Some(normalized));
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(e) => reject(&request, &e),
    }
}
