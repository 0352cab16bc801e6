//! Trait boundaries to the orchestrator's external collaborators
//!
//! The orchestrator never talks to a signaling socket, a capture device, or
//! a peer transport directly; it goes through the traits in this module so
//! embedders (and tests) can inject their own implementations. A production
//! [`MediaConnector`] backed by the `webrtc` crate lives in
//! [`webrtc`](crate::transport::webrtc).

pub mod webrtc;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::IceConfig;
use crate::media::stream::{MediaStream, MediaTrack, RemoteStream, RemoteTrack, TrackKind};
use crate::peer::connection::Role;
use crate::signal::protocol::SignalPayload;
use crate::Result;

/// Parameters for creating one peer connection
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    /// Remote participant id
    pub user_id: String,
    /// Unique id of this connection incarnation
    pub connection_id: String,
    /// Negotiation role of the local side
    pub role: Role,
    /// ICE servers to use
    pub ice: IceConfig,
}

/// Events emitted by a [`ConnectionHandle`]
///
/// Every event is tagged with the `connection_id` of the incarnation that
/// produced it so late events from a destroyed connection can be discarded.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A locally generated negotiation signal that must reach the remote peer
    SignalOut {
        /// Target participant id
        user_id: String,
        /// Producing connection incarnation
        connection_id: String,
        /// The signal to forward
        payload: SignalPayload,
    },
    /// The transport reached the connected state
    Connected {
        /// Participant id
        user_id: String,
        /// Producing connection incarnation
        connection_id: String,
    },
    /// The transport failed
    Failed {
        /// Participant id
        user_id: String,
        /// Producing connection incarnation
        connection_id: String,
    },
    /// A remote media track arrived
    RemoteTrack {
        /// Participant id
        user_id: String,
        /// Producing connection incarnation
        connection_id: String,
        /// The received track
        track: RemoteTrack,
    },
}

impl ConnectionEvent {
    /// Participant id the event concerns
    pub fn user_id(&self) -> &str {
        match self {
            ConnectionEvent::SignalOut { user_id, .. }
            | ConnectionEvent::Connected { user_id, .. }
            | ConnectionEvent::Failed { user_id, .. }
            | ConnectionEvent::RemoteTrack { user_id, .. } => user_id,
        }
    }

    /// Connection incarnation that produced the event
    pub fn connection_id(&self) -> &str {
        match self {
            ConnectionEvent::SignalOut { connection_id, .. }
            | ConnectionEvent::Connected { connection_id, .. }
            | ConnectionEvent::Failed { connection_id, .. }
            | ConnectionEvent::RemoteTrack { connection_id, .. } => connection_id,
        }
    }
}

/// Channel on which connection handles report their events
pub type ConnectionEvents = mpsc::UnboundedSender<ConnectionEvent>;

/// Factory for peer transport connections
#[async_trait]
pub trait MediaConnector: Send + Sync {
    /// Create a new transport connection for one remote participant
    ///
    /// The handle reports its lifecycle through `events`, tagging every
    /// event with the request's `connection_id`.
    async fn create_connection(
        &self,
        request: ConnectionRequest,
        events: ConnectionEvents,
    ) -> Result<Arc<dyn ConnectionHandle>>;
}

/// One live peer transport connection
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Apply an inbound negotiation signal (offer, answer, or ICE candidate)
    async fn apply_signal(&self, payload: SignalPayload) -> Result<()>;

    /// Start the offer flow (Initiator side)
    async fn start_negotiation(&self) -> Result<()>;

    /// Attach a local track for sending
    async fn attach_track(&self, track: MediaTrack) -> Result<()>;

    /// Replace the outbound track of the given kind in place, without
    /// renegotiation
    async fn replace_outbound_track(&self, kind: TrackKind, track: MediaTrack) -> Result<()>;

    /// Whether the transport's signaling state is stable (no negotiation in
    /// flight)
    async fn signaling_stable(&self) -> bool;

    /// Close the connection and release transport resources
    async fn close(&self);
}

/// Outbound side of the signaling transport
#[async_trait]
pub trait SignalingSender: Send + Sync {
    /// Forward a negotiation signal to one participant
    async fn send_signal(&self, target_user_id: &str, payload: SignalPayload) -> Result<()>;

    /// Announce the local audio mute state to the room
    async fn notify_audio(&self, enabled: bool) -> Result<()>;

    /// Announce the local video mute state to the room
    async fn notify_video(&self, enabled: bool) -> Result<()>;

    /// Announce the local screen-share state to the room
    async fn notify_screen(&self, enabled: bool) -> Result<()>;

    /// Whether the signaling transport is currently connected
    fn is_connected(&self) -> bool;
}

/// Local capture devices
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Capture camera and microphone
    async fn capture_user_media(&self) -> Result<MediaStream>;

    /// Capture the display for screen sharing
    async fn capture_display(&self) -> Result<MediaStream>;
}

/// Category of a connectivity failure surfaced to the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectivityErrorKind {
    /// Automatic reconnection attempts for the participant are exhausted
    RetriesExhausted,
}

/// Sink for UI-facing room state changes
pub trait RoomObserver: Send + Sync {
    /// A participant's remote media changed (new track arrived)
    fn participant_stream_updated(&self, user_id: &str, stream: RemoteStream);

    /// A participant left and their resources were released
    fn participant_removed(&self, user_id: &str);

    /// A participant's connection could not be recovered
    fn connectivity_error(&self, user_id: &str, kind: ConnectivityErrorKind);
}
