//! Per-bridge configuration.

use std::time::Duration;

use portal_core::ContextId;
use portal_settings::BridgeSettings;

/// How a bridge identifies itself and whom it trusts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// The context this bridge runs in. Inbound frames must target it.
    pub context: ContextId,
    /// The only origin whose frames are processed.
    pub trusted_origin: String,
    /// Upper bound on how long a call waits for its response. `None` waits
    /// until the response arrives or the bridge closes.
    pub request_timeout: Option<Duration>,
}

impl BridgeConfig {
    /// Config for the page side.
    pub fn page(trusted_origin: impl Into<String>) -> Self {
        Self {
            context: ContextId::PageScript,
            trusted_origin: trusted_origin.into(),
            request_timeout: None,
        }
    }

    /// Config for the content-script side.
    pub fn content_script(trusted_origin: impl Into<String>) -> Self {
        Self {
            context: ContextId::ContentScript,
            trusted_origin: trusted_origin.into(),
            request_timeout: None,
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build from loaded settings.
    pub fn from_settings(context: ContextId, settings: &BridgeSettings) -> Self {
        Self {
            context,
            trusted_origin: settings.trusted_origin.clone(),
            request_timeout: settings.request_timeout_ms.map(Duration::from_millis),
        }
    }

    /// The context outbound requests are addressed to.
    pub fn remote(&self) -> ContextId {
        self.context.remote()
    }
}
