//! Wire protocol for room events and peer negotiation signals
//!
//! Room events arrive from the signaling transport as JSON tagged with an
//! `event` field; negotiation signals carry a `type` field of `offer`,
//! `answer`, or `ice-candidate` plus an opaque `data` payload. Offer and
//! answer payloads carry the raw SDP string; ICE candidate payloads carry a
//! candidate-init object (`candidate`, `sdpMid`, `sdpMLineIndex`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a peer negotiation signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
    /// Trickle ICE candidate
    IceCandidate,
}

/// A single peer negotiation signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    /// Signal kind
    #[serde(rename = "type")]
    pub kind: SignalKind,

    /// Signal body: SDP string for offer/answer, candidate-init object for ICE
    pub data: Value,
}

impl SignalPayload {
    /// Create an offer payload from an SDP string
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Offer,
            data: Value::String(sdp.into()),
        }
    }

    /// Create an answer payload from an SDP string
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Answer,
            data: Value::String(sdp.into()),
        }
    }

    /// Create an ICE candidate payload from a candidate-init object
    pub fn ice_candidate(data: Value) -> Self {
        Self {
            kind: SignalKind::IceCandidate,
            data,
        }
    }

    /// Extract the SDP string from an offer or answer payload
    pub fn sdp(&self) -> crate::Result<String> {
        match &self.data {
            Value::String(sdp) => Ok(sdp.clone()),
            other => Err(crate::Error::Negotiation(format!(
                "signal payload does not carry an SDP string: {other}"
            ))),
        }
    }
}

/// Events delivered by the signaling transport for the current room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RoomEvent {
    /// A remote participant joined the room
    #[serde(rename = "room-user-joined")]
    UserJoined {
        /// Stable participant id
        #[serde(rename = "userId")]
        user_id: String,
        /// Optional display name
        #[serde(
            rename = "displayName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        display_name: Option<String>,
    },

    /// A remote participant left the room
    #[serde(rename = "room-user-left")]
    UserLeft {
        /// Stable participant id
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// A negotiation signal from a remote participant
    #[serde(rename = "signal")]
    Signal {
        /// Sender participant id
        #[serde(rename = "fromUserId")]
        from_user_id: String,
        /// The signal itself
        #[serde(flatten)]
        payload: SignalPayload,
    },

    /// The room was closed by the server
    #[serde(rename = "room-ended")]
    RoomEnded,
}

impl RoomEvent {
    /// Serialize to a JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
