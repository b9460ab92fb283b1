//! # portal-wallet
//!
//! Wallet methods on top of [`portal_bridge::Bridge`].
//!
//! [`WalletConnection`] maps each wallet operation to a fixed JSON-RPC method
//! name and decodes the result. Inbound wallet events are the closed
//! [`WalletEvent`] set, so listeners are keyed by [`WalletEventName`].

#![deny(unsafe_code)]

pub mod connection;
pub mod events;

pub use connection::{WalletConnection, methods};
pub use events::{ProviderConfig, WalletEvent, WalletEventName};
