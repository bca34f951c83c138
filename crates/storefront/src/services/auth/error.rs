//! Authentication error types.

use thiserror::Error;

/// Errors raised by [`AuthState`](super::AuthState) operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Login was attempted with an empty or whitespace-only username.
    #[error("username must not be empty")]
    EmptyUsername,

    /// Login was attempted while already authenticated. The caller must
    /// log out first; identity transitions are anonymous -> user and
    /// user -> anonymous, nothing else.
    #[error("already logged in as {0}")]
    AlreadyAuthenticated(String),
}
