//! # portal-bridge
//!
//! JSON-RPC over a cross-context message channel.
//!
//! - **Transport**: [`Transport`] seam plus [`WindowChannel`], an in-process
//!   model of a browser window's `postMessage` bus
//! - **Origin filter**: [`OriginFilter`] drops frames from untrusted origins or
//!   addressed to another context before anything decodes them
//! - **Correlator**: [`Bridge::send`], [`Bridge::request`] and friends match
//!   responses to pending calls by id
//! - **Multiplexer**: [`Bridge::on`] / [`Bridge::off`] route typed
//!   [`BridgeEvent`]s to listeners in registration order
//! - **Host**: [`Host`] and [`MethodRegistry`] answer requests on the
//!   privileged side

#![deny(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod event;
pub mod filter;
pub mod host;
pub mod listeners;
pub mod pending;
pub mod telemetry;
pub mod transport;

pub use bridge::{Bridge, ConnectionState};
pub use config::BridgeConfig;
pub use event::{BridgeEvent, EventDecodeError, RawEvent};
pub use filter::OriginFilter;
pub use host::{FnHandler, Host, MethodHandler, MethodRegistry};
pub use listeners::{DispatchOutcome, Listener, ListenerRegistry};
pub use pending::{CallResult, PendingCall, PendingCalls};
pub use transport::{InboundMessage, Transport, WindowChannel, WindowEndpoint};
