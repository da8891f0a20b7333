//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a partial JSON file only overrides the fields it names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpectateSettings {
    /// Connection to the capture-control API.
    pub capture: CaptureSettings,
    /// Connection to the spectate remote control service.
    pub spectate: SpectateEndpointSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl SpectateSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.spectate.endpoint.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "spectate.endpoint must not be empty".into(),
            ));
        }
        if self.spectate.request_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "spectate.requestTimeoutMs must be positive".into(),
            ));
        }
        if self.spectate.dolphin_id_prefix.is_empty() {
            return Err(SettingsError::InvalidValue(
                "spectate.dolphinIdPrefix must not be empty".into(),
            ));
        }
        if self.capture.address.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "capture.address must not be empty".into(),
            ));
        }
        if self.capture.port.parse::<u16>().is_err() {
            return Err(SettingsError::InvalidValue(format!(
                "capture.port {:?} is not a valid port",
                self.capture.port
            )));
        }
        Ok(())
    }
}

/// WebSocket scheme for the capture-control API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureProtocol {
    /// Plain WebSocket.
    #[default]
    Ws,
    /// WebSocket over TLS.
    Wss,
}

impl CaptureProtocol {
    /// URL scheme.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

impl fmt::Display for CaptureProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture-control API connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    /// `ws` or `wss`.
    pub protocol: CaptureProtocol,
    /// Host name or IP.
    pub address: String,
    /// Port, kept as entered.
    pub port: String,
    /// Optional authentication password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl CaptureSettings {
    /// Full WebSocket URL of the capture-control API.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.address, self.port)
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            protocol: CaptureProtocol::Ws,
            address: "127.0.0.1".to_string(),
            port: "4455".to_string(),
            password: None,
        }
    }
}

/// Spectate remote control connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpectateEndpointSettings {
    /// WebSocket URL of the spectate remote control service.
    pub endpoint: String,
    /// Deadline for each correlated response in milliseconds.
    pub request_timeout_ms: u64,
    /// Prefix for locally generated dolphin ids.
    pub dolphin_id_prefix: String,
}

impl Default for SpectateEndpointSettings {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:49809".to_string(),
            request_timeout_ms: 5000,
            dolphin_id_prefix: "spectate-manager-".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `info` or `warn,spectate_client=debug`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_match_original_application() {
        let settings = SpectateSettings::default();
        assert_eq!(settings.capture.url(), "ws://127.0.0.1:4455");
        assert_eq!(settings.spectate.endpoint, "ws://127.0.0.1:49809");
        assert_eq!(settings.spectate.request_timeout_ms, 5000);
        assert!(settings.capture.password.is_none());
        settings.validate().unwrap();
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(SpectateSettings::default()).unwrap();
        assert_eq!(json["spectate"]["requestTimeoutMs"], 5000);
        assert_eq!(json["capture"]["protocol"], "ws");
        assert!(json["capture"].get("password").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: SpectateSettings =
            serde_json::from_str(r#"{"capture":{"protocol":"wss","port":"4456"}}"#).unwrap();
        assert_eq!(settings.capture.url(), "wss://127.0.0.1:4456");
        assert_eq!(settings.spectate, SpectateEndpointSettings::default());
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let result = serde_json::from_str::<SpectateSettings>(r#"{"capture":{"protocol":"http"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut settings = SpectateSettings::default();
        settings.spectate.request_timeout_ms = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_bad_port() {
        let mut settings = SpectateSettings::default();
        settings.capture.port = "obs".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(m)) if m.contains("obs"));
    }

    #[test]
    fn validate_rejects_empty_prefix_and_endpoint() {
        let mut settings = SpectateSettings::default();
        settings.spectate.dolphin_id_prefix.clear();
        assert!(settings.validate().is_err());

        let mut settings = SpectateSettings::default();
        settings.spectate.endpoint = "  ".into();
        assert!(settings.validate().is_err());
    }
}
