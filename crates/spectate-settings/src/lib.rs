//! # spectate-settings
//!
//! Configuration for the spectate manager, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`SpectateSettings::default()`]
//! 2. **User file**: `~/.spectate-manager/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SPECTATE_*` overrides (highest priority)
//!
//! Front ends persist edits with [`save_settings_to_path`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, read_settings_file, save_settings_to_path,
    settings_path,
};
pub use types::*;
