//! `Accept` header negotiation.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;
use crate::state::AppState;

/// Media type chosen for the response, stored in request extensions.
///
/// Read it in handlers with `Option<Extension<NegotiatedType>>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedType(pub String);

/// One `Accept` media range.
#[derive(Debug, Clone, PartialEq)]
struct MediaRange {
    kind: String,
    subtype: String,
    q: f32,
}

impl MediaRange {
    fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let (kind, subtype) = parts.next()?.trim().split_once('/')?;
        let mut q = 1.0_f32;
        for param in parts {
            if let Some((name, value)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("q") {
                    q = value.trim().parse().ok().filter(|q: &f32| (0.0..=1.0).contains(q))?;
                }
            }
        }
        Some(Self {
            kind: kind.trim().to_ascii_lowercase(),
            subtype: subtype.trim().to_ascii_lowercase(),
            q,
        })
    }

    /// Specificity of the match against `kind/subtype`: 2 exact, 1 `type/*`,
    /// 0 `*/*`, `None` no match.
    fn specificity(&self, kind: &str, subtype: &str) -> Option<u8> {
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", "*") => Some(0),
            (k, "*") if k == kind => Some(1),
            (k, s) if k == kind && s == subtype => Some(2),
            _ => None,
        }
    }
}

/// Pick the producible type the client prefers most.
///
/// Each producible type takes the quality of its most specific matching
/// range; ties go to the earlier producible type. `None` when nothing is
/// acceptable.
#[must_use]
pub fn negotiate<'a>(accept: &str, producible: &'a [String]) -> Option<&'a str> {
    let ranges: Vec<MediaRange> = accept.split(',').filter_map(MediaRange::parse).collect();
    if ranges.is_empty() {
        return producible.first().map(String::as_str);
    }

    let mut best: Option<(&str, f32)> = None;
    for candidate in producible {
        let Some((kind, subtype)) = candidate.split_once('/') else {
            continue;
        };
        let q = ranges
            .iter()
            .filter_map(|r| r.specificity(kind, subtype).map(|s| (s, r.q)))
            .max_by_key(|(s, _)| *s)
            .map_or(0.0, |(_, q)| q);
        if q > 0.0 && best.is_none_or(|(_, b)| q > b) {
            best = Some((candidate.as_str(), q));
        }
    }
    best.map(|(t, _)| t)
}

/// Record the negotiated type; in strict mode, answer `406` when there is none.
pub async fn content_negotiation(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let config = &state.config().negotiation;
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    let chosen = match &accept {
        None => config.producible.first().map(String::as_str),
        Some(accept) => negotiate(accept, &config.producible),
    };

    match chosen {
        Some(media) => {
            request.extensions_mut().insert(NegotiatedType(media.to_string()));
        }
        None if config.strict => {
            let accept = accept.unwrap_or_default();
            tracing::debug!(%accept, "No acceptable representation");
            return GatewayError::NotAcceptable(accept).into_response();
        }
        None => {}
    }

    next.run(request).await
}
