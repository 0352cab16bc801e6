//! Full-mesh WebRTC peer-connection orchestration for multi-party calls
//!
//! Given the roster of a room, `meshcall` keeps one bidirectional media
//! connection per remote participant: it negotiates each connection over an
//! injected signaling channel, keeps the local camera, microphone and
//! screen-share tracks synchronized across every connection, and recovers
//! from connectivity failures without a leave/rejoin.
//!
//! # Features
//!
//! - **Full-mesh topology**: one peer connection per remote participant,
//!   capacity-bounded
//! - **Trickle ICE with early-signal buffering**: candidates arriving before
//!   the offer are buffered and replayed in order
//! - **Sender-level track replacement**: mute toggles and screen share never
//!   renegotiate or tear a connection down
//! - **Bounded reconnection**: failed connections are recreated as initiator
//!   up to a configured number of cycles, then surfaced once
//! - **Injected collaborators**: signaling, capture devices, peer transport
//!   and the UI observer are traits; a production transport over the
//!   `webrtc` crate is included
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Signaling transport (embedder)                         │
//! │  ↓ RoomEvent                     ↑ SignalingSender      │
//! │  RoomOrchestrator                                       │
//! │  ├─ SignalRouter (inbound dispatch, outbound forward)   │
//! │  ├─ PeerRegistry (one PeerConnection per participant)   │
//! │  │   └─ ConnectionHandle (webrtc transport)             │
//! │  ├─ PendingSignals (early-signal buffer)                │
//! │  ├─ MediaTrackManager (capture + track sync)            │
//! │  └─ RemoteMediaMap → RoomObserver (UI state)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use meshcall::{OrchestratorConfig, RoomOrchestrator, RoomEvent};
//! use meshcall::transport::webrtc::WebRtcConnector;
//! use std::sync::Arc;
//!
//! let config = OrchestratorConfig {
//!     room_id: "standup".to_string(),
//!     local_user_id: "alice".to_string(),
//!     ..Default::default()
//! };
//!
//! let orchestrator = RoomOrchestrator::new(
//!     config,
//!     signaling,                          // impl SignalingSender
//!     Arc::new(WebRtcConnector::new()),
//!     media_source,                       // impl MediaSource
//!     observer,                           // impl RoomObserver
//! )?;
//!
//! // Feed room events from the signaling socket
//! orchestrator.handle_room_event(RoomEvent::UserJoined {
//!     user_id: "bob".to_string(),
//!     display_name: None,
//! }).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod peer;
pub mod signal;
pub mod transport;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::{IceConfig, OrchestratorConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use media::stream::{MediaStream, MediaTrack, RemoteStream, RemoteTrack, TrackKind, TrackSource};
pub use orchestrator::RoomOrchestrator;
pub use peer::connection::{ConnectionState, Role};
pub use peer::registry::PeerSummary;
pub use signal::protocol::{RoomEvent, SignalKind, SignalPayload};
pub use transport::{
    ConnectionEvent, ConnectionHandle, ConnectionRequest, ConnectivityErrorKind, MediaConnector,
    MediaSource, RoomObserver, SignalingSender,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
