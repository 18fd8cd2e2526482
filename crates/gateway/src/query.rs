//! Query-string access shared by guards and validators.

use axum::http::Uri;

/// Decoded `(name, value)` pairs of the URI's query, in order.
#[must_use]
pub fn pairs(uri: &Uri) -> Vec<(String, String)> {
    uri.query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// First decoded value of parameter `name`.
#[must_use]
pub fn param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
