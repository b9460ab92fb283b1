//! # portal-settings
//!
//! Configuration for the portal bridge, loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`PortalSettings::default()`]
//! 2. **User file** — `~/.portal/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `PORTAL_*` overrides (highest priority)
//!
//! The provider endpoint also honours the legacy `PUBLIC_PROVIDER_URL`
//! variable and falls back to `http://localhost:4000/graphql`.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, load_with_env, normalize_origin,
    settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<PortalSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.portal/settings.json` with env var
/// overrides. If loading fails, logs the error and returns compiled defaults.
pub fn get_settings() -> &'static PortalSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            PortalSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the value back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: PortalSettings) -> std::result::Result<(), PortalSettings> {
    SETTINGS.set(settings)
}
