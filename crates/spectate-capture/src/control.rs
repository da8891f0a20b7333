//! Capture-control API seam.
//!
//! The reconciliation engine and discovery talk to the video-capture
//! application only through [`CaptureControl`]; the remote transport behind it
//! lives with the front end.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CaptureError;
use crate::title::WindowTitle;

/// Input kind that holds playback window captures.
pub const GAME_CAPTURE_KIND: &str = "game_capture";

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of an input listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSummary {
    /// Stable input id.
    pub uuid: String,
    /// Display name.
    pub name: String,
}

/// The subset of an input's settings the manager reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSettings {
    /// Three-part window title.
    #[serde(default)]
    pub window: Option<String>,
    /// `"window"` for window captures.
    #[serde(default)]
    pub capture_mode: Option<String>,
    /// Window matching priority.
    #[serde(default)]
    pub priority: Option<i64>,
}

/// One operation in an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "requestType", rename_all = "PascalCase")]
pub enum CaptureOperation {
    /// Replace an input's `window` setting.
    SetInputSettings {
        /// Input to rewrite.
        uuid: String,
        /// New window title.
        window: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// CaptureControl trait
// ─────────────────────────────────────────────────────────────────────────────

/// Operations the manager needs from the capture-control API.
#[async_trait]
pub trait CaptureControl: Send + Sync {
    /// Inputs of `kind`.
    async fn list_inputs(&self, kind: &str) -> Result<Vec<InputSummary>, CaptureError>;

    /// Settings of one input.
    async fn get_input_settings(&self, uuid: &str) -> Result<InputSettings, CaptureError>;

    /// Replace one input's window title.
    async fn set_input_settings(&self, uuid: &str, window: &str) -> Result<(), CaptureError>;

    /// Apply every operation or none of them.
    async fn batch_apply(&self, operations: Vec<CaptureOperation>) -> Result<(), CaptureError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Mirrored capture source
// ─────────────────────────────────────────────────────────────────────────────

/// A capture source as mirrored for one reconciliation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureInput {
    /// Stable input id.
    pub uuid: String,
    /// Display name.
    pub name: String,
    /// Raw window title.
    pub window: String,
}

impl CaptureInput {
    /// Create a source mirror.
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, window: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            window: window.into(),
        }
    }

    /// Parsed window title.
    pub fn title(&self) -> WindowTitle {
        WindowTitle::parse(&self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_operation_wire_shape() {
        let op = CaptureOperation::SetInputSettings {
            uuid: "u1".into(),
            window: "w".into(),
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({ "requestType": "SetInputSettings", "uuid": "u1", "window": "w" })
        );
    }

    #[test]
    fn settings_tolerate_missing_fields() {
        let settings: InputSettings = serde_json::from_value(json!({ "priority": 2 })).unwrap();
        assert_eq!(settings.window, None);
        assert_eq!(settings.priority, Some(2));
    }

    #[test]
    fn capture_input_parses_its_title() {
        let input = CaptureInput::new("u1", "Left", "Faster Melee - Slippi | A1:c:e");
        assert_eq!(input.title().dolphin_id(), Some("A1"));
    }
}
