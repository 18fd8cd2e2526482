//! Database role name type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Username`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    /// The input string is empty.
    #[error("username cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("username must be at most {max} bytes")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a control character.
    #[error("username cannot contain control characters")]
    ControlCharacter,
}

/// The name of the `PostgreSQL` role a browser session acts as.
///
/// ## Constraints
///
/// - Length: 1-63 bytes (`PostgreSQL` `NAMEDATALEN - 1`)
/// - No control characters (cookies and log lines must stay single-line)
///
/// ## Examples
///
/// ```
/// use lumen_core::Username;
///
/// assert!(Username::parse("alice").is_ok());
/// assert!(Username::parse("report_reader").is_ok());
///
/// assert!(Username::parse("").is_err());
/// assert!(Username::parse("bad\nname").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Maximum length of a role name in bytes.
    pub const MAX_LENGTH: usize = 63;

    /// Parse a `Username` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, longer than 63 bytes, or
    /// contains a control character.
    pub fn parse(s: &str) -> Result<Self, UsernameError> {
        if s.is_empty() {
            return Err(UsernameError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if s.chars().any(char::is_control) {
            return Err(UsernameError::ControlCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Username` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_usernames() {
        assert!(Username::parse("alice").is_ok());
        assert!(Username::parse("app_user-2").is_ok());
        assert!(Username::parse("Ünïcødé").is_ok());
        assert!(Username::parse(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Username::parse(""), Err(UsernameError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        assert!(matches!(
            Username::parse(&"a".repeat(64)),
            Err(UsernameError::TooLong { max: 63 })
        ));
    }

    #[test]
    fn test_parse_control_characters() {
        assert_eq!(
            Username::parse("alice\r\nSet-Cookie: x"),
            Err(UsernameError::ControlCharacter)
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<Username, _> = serde_json::from_str("\"bob\"");
        assert_eq!(ok.unwrap().as_str(), "bob");

        let err: Result<Username, _> = serde_json::from_str("\"\"");
        assert!(err.is_err());
    }
}
