//! Shared type definitions.

mod id;
mod price;

pub use id::{CartKey, ProductId, SessionId};
pub use price::{CurrencyCode, Price};
