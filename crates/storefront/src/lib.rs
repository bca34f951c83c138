//! Eshop Storefront - session & cart state subsystem.
//!
//! This crate is the single source of truth behind the shopper UI: it
//! establishes a durable anonymous session identity, keeps an
//! order-preserving cart keyed by that identity, reconciles the cart when
//! the shopper logs in or out, and fans state changes out to read-only
//! observers (navbar badge, cart panel) without polling.
//!
//! The presentational layer and the remote catalog API are external
//! collaborators; they talk to this crate exclusively through
//! [`state::AppState`] and the [`observe`] views.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod error;
pub mod notify;
pub mod observe;
pub mod remote;
pub mod services;
pub mod session;
pub mod state;
pub mod storage;

pub use cart::{Cart, CartError, CartLineItem, CartSnapshot, CartStore, IdentityReconciler};
pub use error::{Result, StorefrontError};
pub use notify::{Toast, ToastReceiver, ToastSender};
pub use remote::{BackendError, CartBackend, HttpCartBackend, MemoryBackend};
pub use services::auth::{AuthError, AuthIdentity, AuthState, AuthTransition, IdentitySource};
pub use session::SessionIdentity;
pub use state::AppState;
pub use storage::{DurableStorage, FileStorage, MemoryStorage, StorageError};
