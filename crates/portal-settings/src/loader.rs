//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PortalSettings::default()`]
//! 2. If `~/.portal/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::PortalSettings;

/// Provider endpoint override.
pub const ENV_PROVIDER_URL: &str = "PORTAL_PROVIDER_URL";
/// Legacy provider endpoint override, consulted when [`ENV_PROVIDER_URL`] is unset.
pub const ENV_PUBLIC_PROVIDER_URL: &str = "PUBLIC_PROVIDER_URL";
/// Trusted origin override.
pub const ENV_TRUSTED_ORIGIN: &str = "PORTAL_TRUSTED_ORIGIN";
/// Request timeout override in milliseconds.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "PORTAL_REQUEST_TIMEOUT_MS";
/// Log level override.
pub const ENV_LOG_LEVEL: &str = "PORTAL_LOG_LEVEL";

const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Resolve the path to the settings file (`~/.portal/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".portal").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PortalSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PortalSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings using `env` as the variable source.
pub fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<PortalSettings> {
    let defaults = serde_json::to_value(PortalSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PortalSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.bridge.trusted_origin = normalize_origin(&settings.bridge.trusted_origin)?;
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides read through `env`.
///
/// Empty values are ignored. Out-of-range numbers are logged and ignored.
pub fn apply_overrides(settings: &mut PortalSettings, env: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(v) = read(ENV_PROVIDER_URL).or_else(|| read(ENV_PUBLIC_PROVIDER_URL)) {
        settings.provider.url = v;
    }
    if let Some(v) = read(ENV_TRUSTED_ORIGIN) {
        settings.bridge.trusted_origin = v;
    }
    if let Some(v) = read(ENV_REQUEST_TIMEOUT_MS) {
        match parse_u64_range(&v, 1, MAX_TIMEOUT_MS) {
            Some(ms) => settings.bridge.request_timeout_ms = Some(ms),
            None => tracing::warn!(
                key = ENV_REQUEST_TIMEOUT_MS,
                value = %v,
                "invalid timeout env var, ignoring"
            ),
        }
    }
    if let Some(v) = read(ENV_LOG_LEVEL) {
        settings.logging.level = v;
    }
}

/// Check values that deserialization alone cannot.
pub fn validate(settings: &PortalSettings) -> Result<()> {
    let _ = url::Url::parse(&settings.provider.url)
        .map_err(|e| SettingsError::InvalidValue(format!("provider.url: {e}")))?;

    let origin = normalize_origin(&settings.bridge.trusted_origin)?;
    if origin != settings.bridge.trusted_origin {
        return Err(SettingsError::InvalidValue(format!(
            "bridge.trustedOrigin: {} is not in origin form, expected {origin}",
            settings.bridge.trusted_origin
        )));
    }

    if let Some(ms) = settings.bridge.request_timeout_ms {
        if ms == 0 || ms > MAX_TIMEOUT_MS {
            return Err(SettingsError::InvalidValue(format!(
                "bridge.requestTimeoutMs: {ms} is outside 1..={MAX_TIMEOUT_MS}"
            )));
        }
    }
    Ok(())
}

/// Reduce `raw` to the `scheme://host[:port]` form inbound frames carry.
///
/// A lone trailing `/` is dropped and default ports are elided. A path,
/// query, fragment or credentials is an error.
pub fn normalize_origin(raw: &str) -> Result<String> {
    let invalid =
        |reason: String| SettingsError::InvalidValue(format!("bridge.trustedOrigin: {reason}"));
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(invalid(format!("{raw} has an opaque origin")));
    }
    if parsed.path() != "/"
        || parsed.query().is_some()
        || parsed.fragment().is_some()
        || !parsed.username().is_empty()
        || parsed.password().is_some()
    {
        return Err(invalid(format!("{raw} must not carry a path, query, fragment or credentials")));
    }
    Ok(origin.ascii_serialization())
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
