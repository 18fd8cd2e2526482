//! Newtype IDs for type-safe references to externally owned state.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing a session ID with a transaction ID.

/// Macro to define a type-safe, string-backed ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use lumen_core::define_id;
/// define_id!(CursorId);
/// define_id!(PortalId);
///
/// let cursor = CursorId::new("c-1");
/// let portal = PortalId::new("c-1");
///
/// // These are different types, so this won't compile:
/// // let _: CursorId = portal;
/// # let _ = (cursor, portal);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(SessionId);
define_id!(TransactionId);
define_id!(RequestId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_display_their_value() {
        assert_eq!(SessionId::new("abc").to_string(), "abc");
        assert_eq!(RequestId::from("req-1").as_str(), "req-1");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = TransactionId::new("tx-42");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"tx-42\"");
    }

    #[test]
    fn test_into_inner_round_trips() {
        let id = SessionId::new(String::from("s"));
        let raw: String = id.clone().into();
        assert_eq!(raw, id.into_inner());
    }
}
