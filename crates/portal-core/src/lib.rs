//! # portal-core
//!
//! Shared vocabulary for the portal cross-context bridge.
//!
//! - **Identifiers**: [`RequestId`] and [`ListenerId`] as numeric newtypes
//! - **Contexts**: [`ContextId`] naming the page side and the content-script side
//! - **Envelope**: [`Envelope`], the tagged wire wrapper for requests, responses and events
//! - **JSON-RPC**: [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]
//! - **Errors**: [`BridgeError`] covering the caller-visible failure kinds

#![deny(unsafe_code)]

pub mod context;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod jsonrpc;

pub use context::ContextId;
pub use envelope::{Envelope, MessageKind};
pub use errors::{BridgeError, ErrorKind, Rejection, Result};
pub use ids::{IdGenerator, ListenerId, RequestId};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
