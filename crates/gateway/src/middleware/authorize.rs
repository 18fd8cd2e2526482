//! Authorization guards over the grants in context.
//!
//! Guards read `permissions` (filled by `inject_user_permissions`) and the
//! `database`, `schema` and `table` query parameters. Matching is exact; a
//! missing parameter never matches. Without permissions in context the guard
//! answers `401` when nobody is signed in and `403` otherwise.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lumen_core::{Privilege, RoleMetadata, TableRef};

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::query;

/// What a guard demands of the current role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Connect access to `database`.
    Database,
    /// Any privilege on `database.schema.table`.
    Table,
    /// A specific privilege on `database.schema.table`.
    Privilege(Privilege),
}

impl Requirement {
    /// Evaluate against `role` for the query's target.
    fn allows(self, role: &RoleMetadata, target: &Target) -> bool {
        match self {
            Self::Database => target
                .database
                .as_deref()
                .is_some_and(|db| role.can_access_database(db)),
            Self::Table => target
                .table_ref()
                .is_some_and(|table| role.can_access_table(table)),
            Self::Privilege(privilege) => target
                .table_ref()
                .is_some_and(|table| role.has_privilege(table, privilege)),
        }
    }

    fn describe(self) -> String {
        match self {
            Self::Database => "database access".to_string(),
            Self::Table => "table access".to_string(),
            Self::Privilege(p) => format!("{p} privilege"),
        }
    }
}

/// Object named by the query string.
#[derive(Debug, Default)]
struct Target {
    database: Option<String>,
    schema: Option<String>,
    table: Option<String>,
}

impl Target {
    fn from_request(request: &Request) -> Self {
        let uri = request.uri();
        Self {
            database: query::param(uri, "database"),
            schema: query::param(uri, "schema"),
            table: query::param(uri, "table"),
        }
    }

    fn table_ref(&self) -> Option<TableRef<'_>> {
        Some(TableRef {
            database: self.database.as_deref()?,
            schema: self.schema.as_deref()?,
            name: self.table.as_deref()?,
        })
    }
}

/// Decide `requirement` for `request`.
///
/// # Errors
///
/// Returns `Unauthenticated` without user and grants, `Forbidden` otherwise.
pub fn check(requirement: Requirement, request: &Request) -> Result<(), GatewayError> {
    let context = RequestContext::get(request.extensions());
    let Some(role) = context.and_then(|c| c.permissions.as_deref()) else {
        return if context.is_some_and(|c| c.user.is_some()) {
            Err(GatewayError::Forbidden("no grants loaded for user".into()))
        } else {
            Err(GatewayError::Unauthenticated("no user in context".into()))
        };
    };

    let target = Target::from_request(request);
    if requirement.allows(role, &target) {
        Ok(())
    } else {
        tracing::info!(
            role = %role.name,
            requirement = %requirement.describe(),
            database = target.database.as_deref(),
            schema = target.schema.as_deref(),
            table = target.table.as_deref(),
            request_id = context.and_then(RequestContext::request_id_str),
            "Authorization denied"
        );
        Err(GatewayError::Forbidden(format!("missing {}", requirement.describe())))
    }
}

async fn guard(requirement: Requirement, request: Request, next: Next) -> Response {
    match check(requirement, &request) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Allow only roles that may connect to `?database=`.
pub async fn require_database_access(request: Request, next: Next) -> Response {
    guard(Requirement::Database, request, next).await
}

/// Allow only roles holding any grant on `?database=&schema=&table=`.
pub async fn require_table_access(request: Request, next: Next) -> Response {
    guard(Requirement::Table, request, next).await
}

/// Allow only roles with `SELECT` on the target table.
pub async fn require_select_permission(request: Request, next: Next) -> Response {
    guard(Requirement::Privilege(Privilege::Select), request, next).await
}

/// Allow only roles with `INSERT` on the target table.
pub async fn require_insert_permission(request: Request, next: Next) -> Response {
    guard(Requirement::Privilege(Privilege::Insert), request, next).await
}

/// Allow only roles with `UPDATE` on the target table.
pub async fn require_update_permission(request: Request, next: Next) -> Response {
    guard(Requirement::Privilege(Privilege::Update), request, next).await
}

/// Allow only roles with `DELETE` on the target table.
pub async fn require_delete_permission(request: Request, next: Next) -> Response {
    guard(Requirement::Privilege(Privilege::Delete), request, next).await
}
