//! Settings schema.

use serde::{Deserialize, Serialize};

/// Default remote provider endpoint.
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:4000/graphql";
/// Default trusted page origin.
pub const DEFAULT_TRUSTED_ORIGIN: &str = "http://localhost:3000";
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalSettings {
    /// Remote provider endpoint.
    pub provider: ProviderSettings,
    /// Bridge behaviour.
    pub bridge: BridgeSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Provider endpoint configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// Endpoint URL carried with transaction requests.
    pub url: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROVIDER_URL.to_owned(),
        }
    }
}

/// Bridge configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Only frames from this origin are processed.
    pub trusted_origin: String,
    /// Per-request timeout. `None` waits until a response or close.
    pub request_timeout_ms: Option<u64>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            trusted_origin: DEFAULT_TRUSTED_ORIGIN.to_owned(),
            request_timeout_ms: None,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}
