//! Origin and target filtering for inbound frames.
//!
//! Runs on the raw JSON before any envelope decoding. A frame is eligible
//! only when it was posted by the trusted origin and its `target` names this
//! bridge's own context.

use portal_core::{ContextId, Rejection};

use crate::transport::InboundMessage;

/// Accept/reject decision for raw inbound frames.
#[derive(Clone, Debug)]
pub struct OriginFilter {
    trusted_origin: String,
    own_context: ContextId,
}

impl OriginFilter {
    /// Build a filter for a bridge living in `own_context`.
    pub fn new(trusted_origin: impl Into<String>, own_context: ContextId) -> Self {
        Self {
            trusted_origin: trusted_origin.into(),
            own_context,
        }
    }

    /// The only origin whose frames are processed.
    pub fn trusted_origin(&self) -> &str {
        &self.trusted_origin
    }

    /// The context frames must be addressed to.
    pub fn own_context(&self) -> ContextId {
        self.own_context
    }

    /// Check a frame, naming the first failed condition.
    pub fn check(&self, message: &InboundMessage) -> Result<(), Rejection> {
        if message.origin != self.trusted_origin {
            return Err(Rejection::UntrustedOrigin);
        }
        let target = message
            .data
            .get("target")
            .and_then(serde_json::Value::as_str)
            .ok_or(Rejection::MissingTarget)?;
        if target != self.own_context.as_str() {
            return Err(Rejection::WrongTarget);
        }
        Ok(())
    }

    /// Whether the frame passes both checks.
    pub fn accepts(&self, message: &InboundMessage) -> bool {
        self.check(message).is_ok()
    }
}
