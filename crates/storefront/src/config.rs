//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ESHOP_CART_API_URL` - Base URL of the remote cart persistence API
//! - `ESHOP_CART_API_TOKEN` - Bearer token for the cart API
//!
//! ## Optional
//! - `ESHOP_STORAGE_PATH` - Path of the durable key-value file backing
//!   session and auth state (default: in-memory, nothing survives restart)
//! - `ESHOP_RETRY_BACKOFF_MS` - Delay before the single remote retry
//!   (default: 250)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Remote cart API configuration
    pub cart_api: CartApiConfig,
    /// Durable key-value file path; `None` keeps state in memory only
    pub storage_path: Option<PathBuf>,
    /// Delay before the single remote retry
    pub retry_backoff: Duration,
}

/// Remote cart API configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct CartApiConfig {
    /// Base URL of the cart persistence API
    pub base_url: Url,
    /// Bearer token presented on every request
    pub access_token: SecretString,
}

impl std::fmt::Debug for CartApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid,
    /// or if the API token looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let cart_api = CartApiConfig::from_env()?;
        let storage_path = get_optional_env("ESHOP_STORAGE_PATH").map(PathBuf::from);
        let retry_backoff = get_env_or_default("ESHOP_RETRY_BACKOFF_MS", "250")
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("ESHOP_RETRY_BACKOFF_MS".to_string(), e.to_string())
            })?;

        Ok(Self {
            cart_api,
            storage_path,
            retry_backoff,
        })
    }
}

impl CartApiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = get_required_env("ESHOP_CART_API_URL")?
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("ESHOP_CART_API_URL".to_string(), e.to_string())
            })?;

        Ok(Self {
            base_url,
            access_token: get_validated_secret("ESHOP_CART_API_TOKEN")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a secret is not an obvious placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }
    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
