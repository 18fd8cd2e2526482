//! Lumen CLI - operator tools for the gateway.
//!
//! # Usage
//!
//! ```bash
//! # Print Set-Cookie lines for a signed cookie (key from LUMEN_SIGNING_KEY)
//! lumen sign-cookie username alice
//!
//! # Check a cookie signature
//! lumen verify-cookie username alice 9f86d0...
//!
//! # Run a WHERE fragment through the firewall
//! lumen check-where "id = 1 AND status = 'open'"
//!
//! # Run a SQL script through the firewall
//! lumen check-sql --file migration.sql
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lumen")]
#[command(author, version, about = "Lumen-PG gateway tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a cookie value and print both Set-Cookie lines
    SignCookie {
        /// Cookie name
        name: String,
        /// Cookie value
        value: String,
    },
    /// Check a cookie value against its signature
    VerifyCookie {
        /// Cookie name
        name: String,
        /// Cookie value
        value: String,
        /// Hex signature from the `<name>_signature` cookie
        signature: String,
    },
    /// Check a WHERE fragment
    CheckWhere {
        /// Fragment text (without the WHERE keyword)
        fragment: String,
    },
    /// Check a SQL submission and print its normalized form
    CheckSql {
        /// SQL text
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        sql: Option<String>,
        /// Read the SQL from a file instead
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::SignCookie { name, value } => commands::cookie::sign(&name, &value)?,
        Commands::VerifyCookie {
            name,
            value,
            signature,
        } => commands::cookie::verify(&name, &value, &signature)?,
        Commands::CheckWhere { fragment } => commands::firewall::check_where(&fragment)?,
        Commands::CheckSql { sql, file } => {
            let sql = match (sql, file) {
                (Some(sql), _) => sql,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
                (None, None) => return Err("no SQL given".into()),
            };
            commands::firewall::check_sql(&sql)?;
        }
    }
    Ok(())
}
