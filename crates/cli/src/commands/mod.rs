//! Subcommand implementations.

pub mod cookie;
pub mod firewall;
