//! Role grants used by the authorization guards.
//!
//! A [`RoleMetadata`] is discovered by the host application (usually from
//! `pg_roles`, `has_database_privilege` and `information_schema.table_privileges`)
//! and handed to the gateway as-is. Matching is exact string comparison on
//! every component; no case folding or search-path resolution happens here.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A per-table privilege checked by the verb guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// `SELECT` on the table.
    Select,
    /// `INSERT` into the table.
    Insert,
    /// `UPDATE` of table rows.
    Update,
    /// `DELETE` of table rows.
    Delete,
}

impl Privilege {
    /// SQL keyword for the privilege.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully qualified table reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableRef<'a> {
    /// Database name.
    pub database: &'a str,
    /// Schema name.
    pub schema: &'a str,
    /// Table name.
    pub name: &'a str,
}

/// Grants a role holds on a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePermission {
    /// Database the table lives in.
    pub database: String,
    /// Schema the table lives in.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Role may `SELECT`.
    #[serde(default)]
    pub has_select: bool,
    /// Role may `INSERT`.
    #[serde(default)]
    pub has_insert: bool,
    /// Role may `UPDATE`.
    #[serde(default)]
    pub has_update: bool,
    /// Role may `DELETE`.
    #[serde(default)]
    pub has_delete: bool,
}

impl TablePermission {
    /// Whether this entry describes `table`.
    #[must_use]
    pub fn matches(&self, table: TableRef<'_>) -> bool {
        self.database == table.database && self.schema == table.schema && self.name == table.name
    }

    /// Whether this entry grants `privilege`.
    #[must_use]
    pub const fn grants(&self, privilege: Privilege) -> bool {
        match privilege {
            Privilege::Select => self.has_select,
            Privilege::Insert => self.has_insert,
            Privilege::Update => self.has_update,
            Privilege::Delete => self.has_delete,
        }
    }
}

/// Everything a named role may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMetadata {
    /// Role name.
    pub name: String,
    /// Databases the role may connect to.
    #[serde(default)]
    pub accessible_databases: BTreeSet<String>,
    /// Tables the role holds at least one privilege on.
    #[serde(default)]
    pub accessible_tables: Vec<TablePermission>,
}

impl RoleMetadata {
    /// Whether the role may connect to `database`.
    #[must_use]
    pub fn can_access_database(&self, database: &str) -> bool {
        self.accessible_databases.contains(database)
    }

    /// The grant entry for `table`, if any.
    #[must_use]
    pub fn table(&self, table: TableRef<'_>) -> Option<&TablePermission> {
        self.accessible_tables.iter().find(|t| t.matches(table))
    }

    /// Whether the role holds any privilege on `table`.
    #[must_use]
    pub fn can_access_table(&self, table: TableRef<'_>) -> bool {
        self.table(table).is_some()
    }

    /// Whether the role holds `privilege` on `table`.
    #[must_use]
    pub fn has_privilege(&self, table: TableRef<'_>, privilege: Privilege) -> bool {
        self.table(table).is_some_and(|t| t.grants(privilege))
    }
}
