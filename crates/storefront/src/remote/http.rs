//! HTTP cart backend.
//!
//! JSON client for the remote cart persistence API:
//! `GET /carts/{key}` returns the stored cart (404 for never-written keys)
//! and `PUT /carts/{key}` replaces it with the full document.

use std::sync::Arc;

use eshop_core::CartKey;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{BackendError, CartBackend};
use crate::cart::Cart;
use crate::config::CartApiConfig;

/// Client for the remote cart persistence API.
#[derive(Clone)]
pub struct HttpCartBackend {
    inner: Arc<HttpCartBackendInner>,
}

struct HttpCartBackendInner {
    client: reqwest::Client,
    base_url: Url,
    access_token: SecretString,
}

impl HttpCartBackend {
    /// Create a new cart API client.
    #[must_use]
    pub fn new(config: &CartApiConfig) -> Self {
        Self {
            inner: Arc::new(HttpCartBackendInner {
                client: reqwest::Client::new(),
                base_url: config.base_url.clone(),
                access_token: config.access_token.clone(),
            }),
        }
    }

    fn cart_url(&self, key: &CartKey) -> Result<Url, BackendError> {
        self.inner
            .base_url
            .join(&format!("carts/{}", key.storage_key()))
            .map_err(|e| BackendError::Rejected(format!("invalid cart URL: {e}")))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.inner.access_token.expose_secret())
    }
}

/// Extract the throttling delay from a 429 response.
fn retry_after_seconds(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(1)
}

async fn rejection(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    BackendError::Rejected(format!(
        "HTTP {status}: {}",
        body.chars().take(200).collect::<String>()
    ))
}

impl CartBackend for HttpCartBackend {
    async fn fetch_cart(&self, key: &CartKey) -> Result<Cart, BackendError> {
        let url = self.cart_url(key)?;
        let response = self
            .inner
            .client
            .get(url)
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        match response.status() {
            // Carts come into existence on first access.
            StatusCode::NOT_FOUND => Ok(Cart::default()),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(BackendError::RateLimited(retry_after_seconds(&response)))
            }
            status if status.is_success() => {
                let raw = response
                    .text()
                    .await
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
                serde_json::from_str(&raw).map_err(|e| {
                    tracing::error!(
                        error = %e,
                        body = %raw.chars().take(500).collect::<String>(),
                        "failed to parse cart payload"
                    );
                    BackendError::Malformed(e.to_string())
                })
            }
            _ => Err(rejection(response).await),
        }
    }

    async fn save_cart(&self, key: &CartKey, cart: &Cart) -> Result<(), BackendError> {
        let url = self.cart_url(key)?;
        let response = self
            .inner
            .client
            .put(url)
            .header("Authorization", self.bearer())
            .json(cart)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                Err(BackendError::RateLimited(retry_after_seconds(&response)))
            }
            status if status.is_success() => Ok(()),
            _ => Err(rejection(response).await),
        }
    }
}
