//! Newtype IDs for type-safe entity references.
//!
//! The backend issues opaque string identifiers (UUIDs in practice, but the
//! portal never relies on that). Use the `define_id!` macro to create wrappers
//! that prevent accidentally mixing IDs from different tables.

/// Macro to define a type-safe string ID wrapper.
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
/// # use examhub_core::define_id;
/// define_id!(UserId);
/// define_id!(SchoolId);
///
/// let user_id = UserId::new("6b0e2c1a");
/// let school_id = SchoolId::new("6b0e2c1a");
///
/// // These are different types, so this won't compile:
/// // let _: UserId = school_id;
/// assert_eq!(user_id.as_str(), school_id.as_str());
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

// Identity-provider user id (also the primary key of `profiles`).
define_id!(UserId);
// Tenant id (primary key of `schools`).
define_id!(SchoolId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_is_transparent() {
        let id = UserId::new("u1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u1\"");

        let parsed: SchoolId = serde_json::from_str("\"s9\"").unwrap();
        assert_eq!(parsed.as_str(), "s9");
    }

    #[test]
    fn test_display_and_conversions() {
        let id = UserId::from("abc");
        assert_eq!(id.to_string(), "abc");
        assert_eq!(String::from(id.clone()), "abc");
        assert_eq!(id.into_inner(), "abc");
    }
}
