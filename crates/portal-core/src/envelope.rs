//! Wire-level envelope exchanged over the window message channel.
//!
//! Every frame is a JSON object tagged by `type`:
//!
//! ```text
//! { "type": "request",  "target": "PortalContentScript", "request":  { jsonrpc request } }
//! { "type": "response", "target": "PortalPageScript",    "response": { jsonrpc response } }
//! { "type": "event",    "target": "PortalPageScript",    "eventName": "accounts", "data": [...] }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ContextId;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};

/// Discriminant of an [`Envelope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Outbound call.
    Request,
    /// Reply to a call.
    Response,
    /// Unsolicited notification.
    Event,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Response => write!(f, "response"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// A single message on the channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Envelope {
    /// JSON-RPC call addressed to `target`.
    Request {
        /// Receiving context.
        target: ContextId,
        /// The call.
        request: JsonRpcRequest,
    },
    /// JSON-RPC reply addressed to `target`.
    Response {
        /// Receiving context.
        target: ContextId,
        /// The reply.
        response: JsonRpcResponse,
    },
    /// Named event with an arbitrary payload.
    #[serde(rename_all = "camelCase")]
    Event {
        /// Receiving context.
        target: ContextId,
        /// Event name (e.g. `accounts`).
        event_name: String,
        /// Event payload.
        #[serde(default)]
        data: Value,
    },
}

impl Envelope {
    /// Wrap a request for `target`.
    pub fn request(target: ContextId, request: JsonRpcRequest) -> Self {
        Self::Request { target, request }
    }

    /// Wrap a response for `target`.
    pub fn response(target: ContextId, response: JsonRpcResponse) -> Self {
        Self::Response { target, response }
    }

    /// Build an event for `target`.
    pub fn event(target: ContextId, event_name: impl Into<String>, data: Value) -> Self {
        Self::Event {
            target,
            event_name: event_name.into(),
            data,
        }
    }

    /// Which of the three kinds this is.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request { .. } => MessageKind::Request,
            Self::Response { .. } => MessageKind::Response,
            Self::Event { .. } => MessageKind::Event,
        }
    }

    /// The context this envelope is addressed to.
    pub fn target(&self) -> ContextId {
        match self {
            Self::Request { target, .. }
            | Self::Response { target, .. }
            | Self::Event { target, .. } => *target,
        }
    }

    /// Serialize for posting.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Decode a raw frame.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RequestId;
    use serde_json::json;

    #[test]
    fn request_envelope_wire_shape() {
        let env = Envelope::request(
            ContextId::ContentScript,
            JsonRpcRequest::new(RequestId::from_raw(1), "accounts", json!({})),
        );
        let v = env.to_value().unwrap();
        assert_eq!(v["type"], "request");
        assert_eq!(v["target"], "PortalContentScript");
        assert_eq!(v["request"]["method"], "accounts");
        assert_eq!(v["request"]["id"], 1);
    }

    #[test]
    fn event_envelope_uses_camel_case() {
        let env = Envelope::event(ContextId::PageScript, "currentAccount", json!("0xabc"));
        let v = env.to_value().unwrap();
        assert_eq!(v, json!({
            "type": "event",
            "target": "PortalPageScript",
            "eventName": "currentAccount",
            "data": "0xabc"
        }));
    }

    #[test]
    fn decode_response_frame() {
        let env = Envelope::from_value(json!({
            "type": "response",
            "target": "PortalPageScript",
            "response": {"jsonrpc": "2.0", "id": 5, "result": true}
        }))
        .unwrap();
        assert_eq!(env.kind(), MessageKind::Response);
        assert_eq!(env.target(), ContextId::PageScript);
        let Envelope::Response { response, .. } = env else {
            panic!("expected response");
        };
        assert_eq!(response.id, Some(RequestId::from_raw(5)));
    }

    #[test]
    fn event_without_data_defaults_to_null() {
        let env = Envelope::from_value(json!({
            "type": "event",
            "target": "PortalPageScript",
            "eventName": "connection"
        }))
        .unwrap();
        let Envelope::Event { data, .. } = env else {
            panic!("expected event");
        };
        assert!(data.is_null());
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let err = Envelope::from_value(json!({"type": "ping", "target": "PortalPageScript"}));
        assert!(err.is_err());
    }

    #[test]
    fn unknown_target_fails_to_decode() {
        let err = Envelope::from_value(json!({
            "type": "event",
            "target": "SomeoneElse",
            "eventName": "x"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn kind_display() {
        assert_eq!(MessageKind::Request.to_string(), "request");
        assert_eq!(MessageKind::Response.to_string(), "response");
        assert_eq!(MessageKind::Event.to_string(), "event");
    }
}
