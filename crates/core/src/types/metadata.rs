//! Database metadata cached per session.

use serde::{Deserialize, Serialize};

/// A schema visible to the session's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Schema name.
    pub name: String,
    /// Tables in the schema visible to the role.
    #[serde(default)]
    pub tables: Vec<String>,
}

/// Structural metadata for the database a session is browsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    /// Database name.
    pub database: String,
    /// Visible schemas. Non-empty whenever the role has any access.
    #[serde(default)]
    pub schemas: Vec<SchemaInfo>,
}
