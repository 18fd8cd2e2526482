//! Identity and session types resolved for each request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SessionId, TransactionId, Username};

/// The authenticated end user a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Database role name.
    pub username: Username,
}

impl User {
    /// Create a user for the given role name.
    #[must_use]
    pub const fn new(username: Username) -> Self {
        Self { username }
    }
}

/// A browser session as persisted by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session identifier (the `session_id` cookie value).
    pub id: SessionId,
    /// Role the session was opened for.
    pub username: Username,
    /// Instant after which the session is no longer valid.
    pub expires_at: DateTime<Utc>,
    /// Per-session anti-forgery token, when the host issues one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

impl Session {
    /// Whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the session was opened for `username`.
    #[must_use]
    pub fn is_bound_to(&self, username: &Username) -> bool {
        &self.username == username
    }
}

/// An open (or recently closed) SQL transaction tracked across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionState {
    /// Transaction identifier (the `transaction_id` cookie value).
    pub id: TransactionId,
    /// Whether the transaction is still open.
    pub active: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(expires_at: DateTime<Utc>) -> Session {
        Session {
            id: SessionId::new("s-1"),
            username: Username::parse("alice").unwrap(),
            expires_at,
            csrf_token: None,
        }
    }

    #[test]
    fn test_session_expiry_boundary() {
        let now = Utc::now();
        assert!(session(now).is_expired_at(now));
        assert!(!session(now + Duration::seconds(1)).is_expired_at(now));
        assert!(session(now - Duration::hours(1)).is_expired());
    }

    #[test]
    fn test_session_binding() {
        let s = session(Utc::now());
        assert!(s.is_bound_to(&Username::parse("alice").unwrap()));
        assert!(!s.is_bound_to(&Username::parse("mallory").unwrap()));
    }

    #[test]
    fn test_session_csrf_token_optional_in_json() {
        let json = r#"{"id":"s","username":"bob","expires_at":"2030-01-01T00:00:00Z"}"#;
        let parsed: Session = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.csrf_token, None);
    }
}
