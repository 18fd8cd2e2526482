//! Lumen-PG gateway library.
//!
//! The request-processing pipeline that sits in front of the Lumen-PG
//! database frontend: authentication, authorization, the input firewall and
//! the HTTP plumbing around them. The `lumen-gateway` binary is a thin
//! composition root over this crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod context;
pub mod cookies;
pub mod directory;
pub mod error;
pub mod firewall;
pub mod middleware;
pub mod pipeline;
pub mod query;
pub mod state;

pub use config::GatewayConfig;
pub use context::{CurrentUser, MaybeUser, RequestContext};
pub use directory::{Directory, StaticDirectory};
pub use error::GatewayError;
pub use state::AppState;
