//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SpectateSettings::default()`]
//! 2. If `~/.spectate-manager/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::SpectateSettings;

/// Resolve the path to the settings file (`~/.spectate-manager/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home)
        .join(".spectate-manager")
        .join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SpectateSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SpectateSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Load only the file layer, without env overrides.
///
/// Used before saving so values that came from the environment are not
/// written back to disk.
pub fn read_settings_file(path: &Path) -> Result<SpectateSettings> {
    let defaults = serde_json::to_value(SpectateSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Persist settings as pretty JSON, creating the parent directory.
pub fn save_settings_to_path(path: &Path, settings: &SpectateSettings) -> Result<()> {
    settings.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, rendered)?;
    debug!(?path, "settings saved");
    Ok(())
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut SpectateSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (testable without env vars).
pub fn apply_overrides(settings: &mut SpectateSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Spectate endpoint ───────────────────────────────────────────
    if let Some(v) = read_string("SPECTATE_ENDPOINT") {
        settings.spectate.endpoint = v;
    }
    if let Some(v) = read_string("SPECTATE_REQUEST_TIMEOUT_MS") {
        match parse_u64_range(&v, 100, 600_000) {
            Some(ms) => settings.spectate.request_timeout_ms = ms,
            None => {
                tracing::warn!(key = "SPECTATE_REQUEST_TIMEOUT_MS", value = %v, "invalid u64 env var, ignoring");
            }
        }
    }

    // ── Capture-control API ─────────────────────────────────────────
    if let Some(v) = read_string("SPECTATE_CAPTURE_ADDRESS") {
        settings.capture.address = v;
    }
    if let Some(v) = read_string("SPECTATE_CAPTURE_PORT") {
        if parse_u16_range(&v, 1, 65535).is_some() {
            settings.capture.port = v;
        } else {
            tracing::warn!(key = "SPECTATE_CAPTURE_PORT", value = %v, "invalid port env var, ignoring");
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string("SPECTATE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
