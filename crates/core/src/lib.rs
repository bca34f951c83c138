//! Eshop Core - Shared types library.
//!
//! This crate provides common types used across all Eshop components:
//! - `storefront` - Session & cart state subsystem behind the shopper UI
//! - `integration-tests` - Cross-component scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage
//! access. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe ids, cart keys, and prices

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
