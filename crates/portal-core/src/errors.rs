//! Error types for the bridge.
//!
//! [`BridgeError`] is what a caller's future rejects with. Frames that fail
//! origin or target checks never become a `BridgeError`; they are described by
//! [`Rejection`] for logging and then dropped.

use std::fmt;

use thiserror::Error;

use crate::ids::RequestId;
use crate::jsonrpc::JsonRpcError;

/// Machine-readable code for local validation failures.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
/// Machine-readable code for errors returned by the remote context.
pub const REMOTE_ERROR: &str = "REMOTE_ERROR";
/// Machine-readable code for calls made on or pending at a closed bridge.
pub const CONNECTION_CLOSED: &str = "CONNECTION_CLOSED";
/// Machine-readable code for calls that exceeded the configured timeout.
pub const TIMEOUT: &str = "TIMEOUT";
/// Machine-readable code for local serialization failures.
pub const ENCODE_ERROR: &str = "ENCODE_ERROR";
/// Machine-readable code for results that do not fit the expected type.
pub const DECODE_ERROR: &str = "DECODE_ERROR";

/// Coarse classification of a [`BridgeError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-supplied argument failed a precondition; nothing was sent.
    LocalValidation,
    /// The remote context answered with an error.
    RemoteError,
    /// The bridge is closed, or closed while the call was pending.
    ConnectionClosed,
    /// No response arrived within the configured time limit.
    Timeout,
    /// Local (de)serialization failed.
    Codec,
}

/// Errors surfaced to callers of the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Argument rejected before anything was posted.
    #[error("{message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// Error payload returned by the remote context.
    #[error("remote error: {0}")]
    Remote(JsonRpcError),

    /// Call issued after close, or pending when the bridge closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// No response within the configured timeout.
    #[error("request {id} ({method}) timed out after {timeout_ms}ms")]
    Timeout {
        /// Id of the abandoned call.
        id: RequestId,
        /// Method of the abandoned call.
        method: String,
        /// Configured limit.
        timeout_ms: u64,
    },

    /// Parameters or envelope could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The result did not deserialize into the requested type.
    #[error("failed to decode result of {method}: {source}")]
    Decode {
        /// Method whose result was malformed.
        method: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl BridgeError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Classification for recovery decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::LocalValidation,
            Self::Remote(_) => ErrorKind::RemoteError,
            Self::ConnectionClosed => ErrorKind::ConnectionClosed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Encode(_) | Self::Decode { .. } => ErrorKind::Codec,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => VALIDATION_ERROR,
            Self::Remote(_) => REMOTE_ERROR,
            Self::ConnectionClosed => CONNECTION_CLOSED,
            Self::Timeout { .. } => TIMEOUT,
            Self::Encode(_) => ENCODE_ERROR,
            Self::Decode { .. } => DECODE_ERROR,
        }
    }

    /// The remote error payload, if this is a [`BridgeError::Remote`].
    pub fn remote(&self) -> Option<&JsonRpcError> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<JsonRpcError> for BridgeError {
    fn from(err: JsonRpcError) -> Self {
        Self::Remote(err)
    }
}

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Why an inbound frame was dropped before correlation or dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Sender origin differs from the trusted origin.
    UntrustedOrigin,
    /// Frame is not an object or has no string `target`.
    MissingTarget,
    /// `target` names some other context.
    WrongTarget,
    /// Passed the filter but is not a valid envelope.
    Malformed,
}

impl Rejection {
    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UntrustedOrigin => "untrusted_origin",
            Self::MissingTarget => "missing_target",
            Self::WrongTarget => "wrong_target",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
