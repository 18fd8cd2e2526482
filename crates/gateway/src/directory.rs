//! Access to the host's collaborators, with caching.
//!
//! [`Directory`] is the single facade the middlewares use. It wraps the
//! collaborator trait objects from `lumen-core` and caches role grants per
//! username and database metadata per session using `moka`.
//!
//! [`StaticDirectory`] implements every collaborator trait over in-memory
//! maps. The binary loads it from a JSON seed in development and the
//! conformance suite uses it as its fixture store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lumen_core::{
    CsrfValidator, DatabaseMetadata, DirectoryError, MetadataLoader, PermissionLoader,
    RoleMetadata, Session, SessionId, SessionResolver, Username,
};
use moka::future::Cache;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

/// Upper bound on cached entries per cache.
const CACHE_CAPACITY: u64 = 10_000;

/// Facade over the host collaborators used by the pipeline.
#[derive(Clone)]
pub struct Directory {
    sessions: Arc<dyn SessionResolver>,
    permissions: Arc<dyn PermissionLoader>,
    metadata: Arc<dyn MetadataLoader>,
    csrf: Arc<dyn CsrfValidator>,
    permission_cache: Cache<Username, Arc<RoleMetadata>>,
    metadata_cache: Cache<SessionId, Arc<DatabaseMetadata>>,
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("cached_permissions", &self.permission_cache.entry_count())
            .field("cached_metadata", &self.metadata_cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl Directory {
    /// Build a directory from individual collaborators.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionResolver>,
        permissions: Arc<dyn PermissionLoader>,
        metadata: Arc<dyn MetadataLoader>,
        csrf: Arc<dyn CsrfValidator>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            permissions,
            metadata,
            csrf,
            permission_cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build(),
            metadata_cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build(),
        }
    }

    /// Build a directory backed entirely by one [`StaticDirectory`].
    #[must_use]
    pub fn from_static(store: Arc<StaticDirectory>, cache_ttl: Duration) -> Self {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            cache_ttl,
        )
    }

    /// Resolve a session. Lookup failures count as "no session".
    ///
    /// Cached metadata of a session that is gone or expired is dropped.
    pub async fn resolve_session(&self, id: &SessionId) -> Option<Session> {
        match self.sessions.resolve_session(id).await {
            Ok(Some(session)) if !session.is_expired() => Some(session),
            Ok(session) => {
                self.metadata_cache.invalidate(id).await;
                session
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed");
                None
            }
        }
    }

    /// Grants for `username`, cached.
    pub async fn permissions_for(&self, username: &Username) -> Option<Arc<RoleMetadata>> {
        if let Some(cached) = self.permission_cache.get(username).await {
            return Some(cached);
        }

        match self.permissions.load_permissions(username).await {
            Ok(Some(role)) => {
                let role = Arc::new(role);
                self.permission_cache
                    .insert(username.clone(), role.clone())
                    .await;
                Some(role)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, username = %username, "Permission lookup failed");
                None
            }
        }
    }

    /// Metadata for `session`, cached per session ID.
    pub async fn metadata_for(&self, session: &Session) -> Option<Arc<DatabaseMetadata>> {
        if let Some(cached) = self.metadata_cache.get(&session.id).await {
            return Some(cached);
        }

        match self.metadata.load_metadata(session).await {
            Ok(Some(metadata)) => {
                let metadata = Arc::new(metadata);
                self.metadata_cache
                    .insert(session.id.clone(), metadata.clone())
                    .await;
                Some(metadata)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Metadata lookup failed");
                None
            }
        }
    }

    /// Whether `token` is the anti-forgery token of `session`.
    pub async fn is_valid_csrf(&self, token: &str, session: &Session) -> bool {
        self.csrf.is_valid_csrf(token, session).await
    }
}

/// JSON seed for a [`StaticDirectory`].
#[derive(Debug, Default, Deserialize)]
pub struct DirectorySeed {
    /// Persisted sessions.
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// Role grants, keyed by their `name`.
    #[serde(default)]
    pub roles: Vec<RoleMetadata>,
    /// Database metadata keyed by session ID.
    #[serde(default)]
    pub metadata: HashMap<String, DatabaseMetadata>,
}

/// Error loading a directory seed file.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read directory seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse directory seed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct StaticEntries {
    sessions: HashMap<SessionId, Session>,
    roles: HashMap<String, RoleMetadata>,
    metadata: HashMap<SessionId, DatabaseMetadata>,
}

/// In-memory implementation of every collaborator trait.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    entries: RwLock<StaticEntries>,
}

impl StaticDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated from a seed.
    #[must_use]
    pub fn from_seed(seed: DirectorySeed) -> Self {
        let entries = StaticEntries {
            sessions: seed
                .sessions
                .into_iter()
                .map(|s| (s.id.clone(), s))
                .collect(),
            roles: seed
                .roles
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect(),
            metadata: seed
                .metadata
                .into_iter()
                .map(|(id, m)| (SessionId::new(id), m))
                .collect(),
        };
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load a seed from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `SeedError` if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, SeedError> {
        let raw = tokio::fs::read(path).await?;
        let seed: DirectorySeed = serde_json::from_slice(&raw)?;
        Ok(Self::from_seed(seed))
    }

    /// Add or replace a session.
    pub async fn insert_session(&self, session: Session) {
        self.entries
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session);
    }

    /// Add or replace a role's grants.
    pub async fn insert_role(&self, role: RoleMetadata) {
        self.entries
            .write()
            .await
            .roles
            .insert(role.name.clone(), role);
    }

    /// Add or replace the metadata visible to a session.
    pub async fn insert_metadata(&self, id: SessionId, metadata: DatabaseMetadata) {
        self.entries.write().await.metadata.insert(id, metadata);
    }
}

#[async_trait]
impl SessionResolver for StaticDirectory {
    async fn resolve_session(&self, id: &SessionId) -> Result<Option<Session>, DirectoryError> {
        Ok(self.entries.read().await.sessions.get(id).cloned())
    }
}

#[async_trait]
impl PermissionLoader for StaticDirectory {
    async fn load_permissions(
        &self,
        username: &Username,
    ) -> Result<Option<RoleMetadata>, DirectoryError> {
        Ok(self
            .entries
            .read()
            .await
            .roles
            .get(username.as_str())
            .cloned())
    }
}

#[async_trait]
impl MetadataLoader for StaticDirectory {
    async fn load_metadata(
        &self,
        session: &Session,
    ) -> Result<Option<DatabaseMetadata>, DirectoryError> {
        Ok(self
            .entries
            .read()
            .await
            .metadata
            .get(&session.id)
            .cloned())
    }
}

#[async_trait]
impl CsrfValidator for StaticDirectory {
    async fn is_valid_csrf(&self, token: &str, session: &Session) -> bool {
        let entries = self.entries.read().await;
        let expected = entries
            .sessions
            .get(&session.id)
            .and_then(|s| s.csrf_token.as_deref())
            .or(session.csrf_token.as_deref());

        expected.is_some_and(|expected| {
            !token.is_empty() && bool::from(expected.as_bytes().ct_eq(token.as_bytes()))
        })
    }
}
