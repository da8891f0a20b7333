//! Frames exchanged with the spectate control service.
//!
//! Every frame is a JSON object carrying an `op` discriminator. Outbound
//! requests are [`ClientMessage`]s; inbound responses and push events are
//! decoded into [`ServerMessage`] and validated before anything downstream
//! sees them, so a frame with a missing or empty required field never leaks
//! partial data.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, SpectateError};

/// WebSocket sub-protocol announced during the handshake.
pub const SUBPROTOCOL: &str = "spectate-protocol";

/// A broadcast that can be spectated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    /// Opaque broadcast id.
    pub id: String,
    /// Display name (the broadcaster's connect code).
    pub name: String,
    /// Who is broadcasting.
    pub broadcaster: Broadcaster,
}

/// Identity of the player sending a broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcaster {
    /// Stable user id.
    pub uid: String,
    /// Display name.
    pub name: String,
}

impl Broadcast {
    /// Reject entries with any empty string field.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("broadcast.id", &self.id)?;
        require_non_empty("broadcast.name", &self.name)?;
        require_non_empty("broadcast.broadcaster.uid", &self.broadcaster.uid)?;
        require_non_empty("broadcast.broadcaster.name", &self.broadcaster.name)
    }
}

/// One broadcast currently routed into a playback instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectatingBroadcast {
    /// Broadcast being watched.
    pub broadcast_id: String,
    /// Playback instance showing it.
    pub dolphin_id: String,
}

impl SpectatingBroadcast {
    /// Build an entry from borrowed ids.
    pub fn new(broadcast_id: impl Into<String>, dolphin_id: impl Into<String>) -> Self {
        Self {
            broadcast_id: broadcast_id.into(),
            dolphin_id: dolphin_id.into(),
        }
    }

    /// Reject entries with an empty id on either side.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("broadcastId", &self.broadcast_id)?;
        require_non_empty("dolphinId", &self.dolphin_id)
    }
}

/// Requests sent to the spectate control service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op")]
pub enum ClientMessage {
    /// Ask for every broadcast currently available.
    #[serde(rename = "list-broadcasts-request")]
    ListBroadcasts,
    /// Ask for `broadcast_id` to be shown in a playback instance.
    #[serde(rename = "spectate-broadcast-request")]
    SpectateBroadcast {
        /// Broadcast to spectate.
        #[serde(rename = "broadcastId")]
        broadcast_id: String,
        /// Preferred playback instance; the server may pick another.
        #[serde(rename = "dolphinId")]
        dolphin_id: String,
    },
}

impl ClientMessage {
    /// Response discriminator the server answers this request with.
    pub fn response_op(&self) -> ServerOp {
        match self {
            Self::ListBroadcasts => ServerOp::ListBroadcastsResponse,
            Self::SpectateBroadcast { .. } => ServerOp::SpectateBroadcastResponse,
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Discriminators of inbound frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerOp {
    /// Reply to [`ClientMessage::ListBroadcasts`].
    ListBroadcastsResponse,
    /// Reply to [`ClientMessage::SpectateBroadcast`].
    SpectateBroadcastResponse,
    /// Mapping snapshot pushed once when a connection opens.
    SpectatingBroadcastsEvent,
    /// A playback instance went away.
    DolphinClosedEvent,
}

impl ServerOp {
    /// Wire string for this discriminator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListBroadcastsResponse => "list-broadcasts-response",
            Self::SpectateBroadcastResponse => "spectate-broadcast-response",
            Self::SpectatingBroadcastsEvent => "spectating-broadcasts-event",
            Self::DolphinClosedEvent => "dolphin-closed-event",
        }
    }

    /// Parse a wire discriminator.
    pub fn from_wire(op: &str) -> Option<Self> {
        match op {
            "list-broadcasts-response" => Some(Self::ListBroadcastsResponse),
            "spectate-broadcast-response" => Some(Self::SpectateBroadcastResponse),
            "spectating-broadcasts-event" => Some(Self::SpectatingBroadcastsEvent),
            "dolphin-closed-event" => Some(Self::DolphinClosedEvent),
            _ => None,
        }
    }

    /// Whether frames with this discriminator arrive unsolicited.
    pub fn is_push(self) -> bool {
        matches!(
            self,
            Self::SpectatingBroadcastsEvent | Self::DolphinClosedEvent
        )
    }
}

impl fmt::Display for ServerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Responses and push events received from the spectate control service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op")]
pub enum ServerMessage {
    /// Available broadcasts, or the reason they could not be listed.
    #[serde(rename = "list-broadcasts-response")]
    ListBroadcastsResponse {
        /// Present on success.
        #[serde(default)]
        broadcasts: Option<Vec<Broadcast>>,
        /// Present on failure.
        #[serde(default)]
        err: Option<String>,
    },
    /// The playback instance assigned to a spectate request.
    #[serde(rename = "spectate-broadcast-response")]
    SpectateBroadcastResponse {
        /// Present on success; may differ from the requested id.
        #[serde(default, rename = "dolphinId")]
        dolphin_id: Option<String>,
        /// Present on failure.
        #[serde(default)]
        err: Option<String>,
    },
    /// Every broadcast currently being spectated.
    #[serde(rename = "spectating-broadcasts-event")]
    SpectatingBroadcastsEvent {
        /// Snapshot entries.
        #[serde(rename = "spectatingBroadcasts")]
        spectating_broadcasts: Vec<SpectatingBroadcast>,
    },
    /// A playback instance closed.
    #[serde(rename = "dolphin-closed-event")]
    DolphinClosedEvent {
        /// Instance that went away.
        #[serde(rename = "dolphinId")]
        dolphin_id: String,
    },
}

impl ServerMessage {
    /// Decode and validate a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decode and validate an already-parsed frame.
    pub fn from_value(value: Value) -> Result<Self> {
        let message: Self = serde_json::from_value(value)?;
        message.validate()?;
        Ok(message)
    }

    /// Discriminator of this frame.
    pub fn op(&self) -> ServerOp {
        match self {
            Self::ListBroadcastsResponse { .. } => ServerOp::ListBroadcastsResponse,
            Self::SpectateBroadcastResponse { .. } => ServerOp::SpectateBroadcastResponse,
            Self::SpectatingBroadcastsEvent { .. } => ServerOp::SpectatingBroadcastsEvent,
            Self::DolphinClosedEvent { .. } => ServerOp::DolphinClosedEvent,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::ListBroadcastsResponse { broadcasts, err } => match (broadcasts, err) {
                (_, Some(_)) => Ok(()),
                (Some(broadcasts), None) => broadcasts.iter().try_for_each(Broadcast::validate),
                (None, None) => Err(SpectateError::protocol(
                    "list-broadcasts-response carries neither broadcasts nor err",
                )),
            },
            Self::SpectateBroadcastResponse { dolphin_id, err } => match (dolphin_id, err) {
                (_, Some(_)) => Ok(()),
                (Some(id), None) => require_non_empty("dolphinId", id),
                (None, None) => Err(SpectateError::protocol(
                    "spectate-broadcast-response carries neither dolphinId nor err",
                )),
            },
            Self::SpectatingBroadcastsEvent {
                spectating_broadcasts,
            } => spectating_broadcasts
                .iter()
                .try_for_each(SpectatingBroadcast::validate),
            Self::DolphinClosedEvent { dolphin_id } => require_non_empty("dolphinId", dolphin_id),
        }
    }
}

/// Read the `op` discriminator of a frame without decoding the rest.
pub fn peek_op(value: &Value) -> Option<ServerOp> {
    value
        .get("op")
        .and_then(Value::as_str)
        .and_then(ServerOp::from_wire)
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        Err(SpectateError::ProtocolError(format!("{field} must be a non-empty string")))
    } else {
        Ok(())
    }
}
