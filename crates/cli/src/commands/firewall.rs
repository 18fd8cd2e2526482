//! Offline runs of the input firewall.

use std::io::Write;

use lumen_gateway::firewall::{self, ValidationError};

/// Check a WHERE fragment.
///
/// # Errors
///
/// Returns the firewall's rejection reason.
pub fn check_where(fragment: &str) -> Result<(), Box<dyn std::error::Error>> {
    firewall::check_where_clause(fragment).map_err(rejected)?;
    writeln!(std::io::stdout().lock(), "accepted")?;
    Ok(())
}

/// Check a SQL submission and print its normalized text.
///
/// # Errors
///
/// Returns the firewall's rejection reason.
pub fn check_sql(sql: &str) -> Result<(), Box<dyn std::error::Error>> {
    let normalized = firewall::check_sql_query(sql).map_err(rejected)?;
    writeln!(std::io::stdout().lock(), "{normalized}")?;
    Ok(())
}

fn rejected(e: ValidationError) -> Box<dyn std::error::Error> {
    format!("rejected: {e}").into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_check_where() {
        assert!(check_where("id = 1").is_ok());
        let err = check_where("1=1; DROP TABLE users").unwrap_err();
        assert!(err.to_string().starts_with("rejected:"));
    }

    #[test]
    fn test_check_sql() {
        assert!(check_sql("SELECT *\n  FROM users").is_ok());
        assert!(check_sql("TRUNCATE users").is_err());
    }
}
