//! Remote cart persistence.
//!
//! The remote side is an eventually-consistent cache of the in-memory
//! cart, never the immediate source of truth for rendering. Saves carry
//! the full cart document, so retried sends are idempotent by
//! construction.

mod http;
mod memory;

pub use http::HttpCartBackend;
pub use memory::MemoryBackend;

use std::future::Future;
use std::time::Duration;

use eshop_core::CartKey;
use thiserror::Error;

use crate::cart::Cart;

/// Errors raised by a cart backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The remote API could not be reached.
    #[error("remote cart API unreachable: {0}")]
    Transport(String),

    /// The remote API throttled the request.
    #[error("remote cart API rate limited, retry after {0}s")]
    RateLimited(u64),

    /// The remote API answered with a payload we cannot decode.
    #[error("remote cart API returned a malformed payload: {0}")]
    Malformed(String),

    /// The remote API rejected the request outright.
    #[error("remote cart API rejected the request: {0}")]
    Rejected(String),
}

/// Remote cart persistence contract.
///
/// `fetch_cart` returns an empty cart for a key that has never been
/// written: carts come into existence on first access. `save_cart` must be
/// idempotent so the single retry can never produce a different end state.
pub trait CartBackend: Send + Sync + 'static {
    /// Fetch the cart stored under `key`.
    fn fetch_cart(
        &self,
        key: &CartKey,
    ) -> impl Future<Output = Result<Cart, BackendError>> + Send;

    /// Replace the cart stored under `key`.
    fn save_cart(
        &self,
        key: &CartKey,
        cart: &Cart,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Run `op`, retrying once after `backoff` on failure.
///
/// A rate-limited first attempt honors the server's `Retry-After` when it
/// is longer than the configured backoff.
pub(crate) async fn with_retry<T, F, Fut>(backoff: Duration, op: F) -> Result<T, BackendError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            let wait = match &first {
                BackendError::RateLimited(secs) => backoff.max(Duration::from_secs(*secs)),
                _ => backoff,
            };
            tracing::debug!(error = %first, wait_ms = wait.as_millis(), "retrying remote cart call");
            tokio::time::sleep(wait).await;

            op().await.map_err(|second| {
                tracing::warn!(error = %second, "remote cart call failed after retry");
                second
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry(Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, BackendError>(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_once() {
        let calls = AtomicU32::new(0);
        let result = with_retry(Duration::from_millis(1), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(BackendError::Transport("first attempt".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_second_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::Transport("down".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
