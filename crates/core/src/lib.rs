//! Lumen-PG Core - Shared types library.
//!
//! This crate provides the types shared by every Lumen-PG component:
//! - `gateway` - The request-processing middleware pipeline
//! - `cli` - Operator tools (cookie signing, firewall checks)
//! - `integration-tests` - The conformance suite
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP. This keeps it lightweight and lets hosts implement the collaborator
//! traits against whatever storage they use.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for identities, sessions, grants and metadata
//! - [`directory`] - Collaborator traits the gateway consumes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod directory;
pub mod types;

pub use directory::{
    CsrfValidator, DirectoryError, MetadataLoader, PermissionLoader, SessionResolver,
};
pub use types::*;
