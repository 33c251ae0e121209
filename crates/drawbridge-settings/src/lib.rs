//! # drawbridge-settings
//!
//! Layered configuration for the bridge.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **Settings file**: `~/.drawbridge/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `DRAWBRIDGE_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_file_layer, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::{BridgeSettings, BusSettings, LoggingSettings, ServerSettings};
