//! Crate-wide error type.

use thiserror::Error;

use crate::cart::CartError;
use crate::config::ConfigError;
use crate::services::auth::AuthError;
use crate::storage::StorageError;

/// Any error the storefront state layer can surface to a caller.
#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias for storefront results.
pub type Result<T> = std::result::Result<T, StorefrontError>;
