//! Window-title codec for playback capture sources.
//!
//! A capture source's `window` setting has three colon-separated parts:
//! `"<label>[ | <dolphinId>]:<windowClass>:<exeName>"`. Only part 0 is ever
//! interpreted; parts 1 and 2 are carried through untouched.

use std::fmt;

/// Label prefix every playback window title starts with.
pub const LABEL_PREFIX: &str = "Faster Melee - Slippi";

const ID_SEPARATOR: &str = " | ";

/// Parsed window title.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowTitle {
    label: String,
    dolphin_id: Option<String>,
    /// Everything after the first `:`, verbatim (including the colon).
    rest: String,
}

impl WindowTitle {
    /// Split `window` into label, dolphin id and the opaque remainder.
    pub fn parse(window: &str) -> Self {
        let (head, rest) = match window.find(':') {
            Some(at) => window.split_at(at),
            None => (window, ""),
        };
        let (label, dolphin_id) = match head.rsplit_once(ID_SEPARATOR) {
            Some((label, id)) if !id.is_empty() => (label, Some(id.to_string())),
            _ => (head, None),
        };
        Self {
            label: label.to_string(),
            dolphin_id,
            rest: rest.to_string(),
        }
    }

    /// Human label in part 0, without the dolphin id suffix.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Dolphin id encoded in part 0, if any.
    pub fn dolphin_id(&self) -> Option<&str> {
        self.dolphin_id.as_deref()
    }

    /// Whether the label is a playback window label.
    pub fn is_playback(&self) -> bool {
        self.label.starts_with(LABEL_PREFIX)
    }

    /// Same title with part 0 encoding `dolphin_id` (or no id).
    #[must_use]
    pub fn with_dolphin_id(&self, dolphin_id: Option<&str>) -> Self {
        Self {
            label: self.label.clone(),
            dolphin_id: dolphin_id.map(str::to_string),
            rest: self.rest.clone(),
        }
    }

    /// Encoded form.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WindowTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        if let Some(id) = &self.dolphin_id {
            write!(f, "{ID_SEPARATOR}{id}")?;
        }
        f.write_str(&self.rest)
    }
}
