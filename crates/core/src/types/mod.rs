//! Core types for Lumen-PG.
//!
//! This module provides type-safe wrappers for the identities, sessions and
//! grants that flow through the gateway.

pub mod id;
pub mod metadata;
pub mod permissions;
pub mod session;
pub mod username;

pub use id::*;
pub use metadata::{DatabaseMetadata, SchemaInfo};
pub use permissions::{Privilege, RoleMetadata, TablePermission, TableRef};
pub use session::{Session, TransactionState, User};
pub use username::{Username, UsernameError};
