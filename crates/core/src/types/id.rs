//! Newtype ids for type-safe entity references.
//!
//! Use the `define_str_id!` macro to create type-safe wrappers around the
//! opaque string identifiers the remote catalog and cart APIs hand out,
//! preventing accidentally mixing ids from different entity types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe opaque string id.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `Display`
/// - Conversion methods: `new()`, `as_str()`
/// - `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use eshop_core::define_str_id;
/// define_str_id!(SkuId);
/// define_str_id!(WarehouseId);
///
/// let sku = SkuId::new("sku-1");
///
/// // These are different types, so this won't compile:
/// // let _: WarehouseId = sku;
/// ```
#[macro_export]
macro_rules! define_str_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new id from a string value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

// Define standard entity ids
define_str_id!(ProductId);
define_str_id!(SessionId);

impl SessionId {
    /// Generate a fresh globally-unique session token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// The ownership key selecting which cart is authoritative.
///
/// Exactly one `CartKey` is active at any time: the anonymous
/// [`SessionId`] before login, a user-scoped key after. Switching the
/// active key is the sole trigger for cart reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartKey {
    /// Anonymous cart, owned by the durable session token.
    Session { session_id: SessionId },
    /// Authenticated cart, owned by the signed-in user.
    User { username: String },
}

impl CartKey {
    /// Key for an anonymous session-owned cart.
    #[must_use]
    pub const fn session(session_id: SessionId) -> Self {
        Self::Session { session_id }
    }

    /// Key for a user-owned cart.
    #[must_use]
    pub fn user(username: impl Into<String>) -> Self {
        Self::User {
            username: username.into(),
        }
    }

    /// Render the key as stored by the remote cart API.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            Self::Session { session_id } => format!("session:{session_id}"),
            Self::User { username } => format!("user:{username}"),
        }
    }

    /// Whether this key belongs to an anonymous session.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Session { .. })
    }
}

impl std::fmt::Display for CartKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}
