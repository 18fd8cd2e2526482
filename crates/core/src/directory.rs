//! Collaborator traits supplied by the host application.
//!
//! The gateway never talks to `PostgreSQL` itself. Session storage, role
//! discovery and metadata introspection live behind these traits; the
//! host wires concrete implementations into the gateway state at startup.
//!
//! Implementations must be safe to call concurrently from many requests.
//! Any call may suspend on I/O.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DatabaseMetadata, RoleMetadata, Session, SessionId, Username};

/// Failure reported by a collaborator.
///
/// The gateway treats every variant the same way (the lookup counts as a
/// miss); the distinction exists for logging.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The backing store could not be reached in time.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The backing store returned data that could not be interpreted.
    #[error("malformed directory record: {0}")]
    Malformed(String),

    /// Anything else.
    #[error("directory error: {0}")]
    Other(String),
}

/// Resolves a `session_id` cookie to a persisted session.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Look up the session. `Ok(None)` means the session does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError` on transient lookup failures.
    async fn resolve_session(&self, id: &SessionId) -> Result<Option<Session>, DirectoryError>;
}

/// Loads the grants held by a database role.
#[async_trait]
pub trait PermissionLoader: Send + Sync {
    /// Load role metadata. `Ok(None)` means the role is unknown.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError` on transient lookup failures.
    async fn load_permissions(
        &self,
        username: &Username,
    ) -> Result<Option<RoleMetadata>, DirectoryError>;
}

/// Loads structural metadata for the database a session is browsing.
#[async_trait]
pub trait MetadataLoader: Send + Sync {
    /// Load metadata. `Ok(None)` means nothing is visible to the session.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError` on transient lookup failures.
    async fn load_metadata(
        &self,
        session: &Session,
    ) -> Result<Option<DatabaseMetadata>, DirectoryError>;
}

/// Checks a submitted anti-forgery token against a session.
#[async_trait]
pub trait CsrfValidator: Send + Sync {
    /// Whether `token` is the one issued to `session`.
    async fn is_valid_csrf(&self, token: &str, session: &Session) -> bool;
}
