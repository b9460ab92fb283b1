//! Typed events carried by the bridge.
//!
//! Event frames arrive as `(eventName, data)` pairs. A [`BridgeEvent`]
//! implementation turns them into a closed enum so listeners are keyed by a
//! typed name and receive a typed payload. Frames whose name the enum does
//! not know are dropped at decode time.

use std::fmt;
use std::hash::Hash;

use serde_json::Value;
use thiserror::Error;

/// Why an event frame could not be decoded.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The name is not one this bridge understands.
    #[error("unknown event name: {0}")]
    UnknownName(String),
    /// The payload does not match the event's schema.
    #[error("invalid payload for event {name}: {source}")]
    InvalidPayload {
        /// Event name.
        name: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// An event type dispatched by a bridge.
pub trait BridgeEvent: Sized + Send + Sync + 'static {
    /// Key listeners register under.
    type Name: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// The key for this event.
    fn name(&self) -> Self::Name;

    /// Decode a wire frame.
    fn decode(event_name: &str, data: Value) -> Result<Self, EventDecodeError>;
}

/// Untyped event, for bridges that do not model a closed event set.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEvent {
    /// Wire name.
    pub name: String,
    /// Payload as received.
    pub data: Value,
}

impl BridgeEvent for RawEvent {
    type Name = String;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn decode(event_name: &str, data: Value) -> Result<Self, EventDecodeError> {
        Ok(Self {
            name: event_name.to_owned(),
            data,
        })
    }
}
