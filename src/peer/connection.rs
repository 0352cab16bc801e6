//! Per-participant peer connection state

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tracing::debug;

use crate::media::stream::{MediaTrack, TrackKind};
use crate::signal::protocol::SignalPayload;
use crate::transport::ConnectionHandle;
use crate::Result;

/// Negotiation role of the local side, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Local side sends the offer
    Initiator,
    /// Local side answers a received offer
    Responder,
}

/// Lifecycle state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no signal exchanged yet
    New,
    /// Negotiation in progress
    Negotiating,
    /// Media flowing
    Connected,
    /// Transport failed; reconnection may follow
    Failed,
    /// Destroyed; terminal
    Closed,
}

/// One connection to a remote participant
///
/// Owned exclusively by the registry; one incarnation per `connection_id`.
/// A reconnection cycle destroys the incarnation and creates a new one with
/// a fresh id.
pub struct PeerConnection {
    user_id: String,
    connection_id: String,
    role: Role,
    state: RwLock<ConnectionState>,
    retry_count: AtomicU32,
    handle: Arc<dyn ConnectionHandle>,
    outbound_tracks: RwLock<HashMap<TrackKind, MediaTrack>>,
    created_at: SystemTime,
    connected_at: RwLock<Option<SystemTime>>,
}

impl PeerConnection {
    pub(crate) fn new(
        user_id: String,
        connection_id: String,
        role: Role,
        handle: Arc<dyn ConnectionHandle>,
    ) -> Self {
        Self {
            user_id,
            connection_id,
            role,
            state: RwLock::new(ConnectionState::New),
            retry_count: AtomicU32::new(0),
            handle,
            outbound_tracks: RwLock::new(HashMap::new()),
            created_at: SystemTime::now(),
            connected_at: RwLock::new(None),
        }
    }

    /// Remote participant id
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Id of this connection incarnation
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Negotiation role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Reconnection cycle this incarnation belongs to (0 for the first)
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub(crate) fn set_retry_count(&self, count: u32) {
        self.retry_count.store(count, Ordering::SeqCst);
    }

    pub(crate) fn reset_retries(&self) {
        self.retry_count.store(0, Ordering::SeqCst);
    }

    /// How long the connection has been established, if it is
    pub async fn connection_duration(&self) -> Option<Duration> {
        let connected_at = (*self.connected_at.read().await)?;
        connected_at.elapsed().ok()
    }

    /// Age of this incarnation
    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }

    pub(crate) async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.write().await;
        if *state == new_state {
            return;
        }
        debug!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            from = ?*state,
            to = ?new_state,
            "peer connection state change"
        );
        *state = new_state;
        if new_state == ConnectionState::Connected {
            *self.connected_at.write().await = Some(SystemTime::now());
        }
    }

    /// Move to Negotiating from New or Failed; other states are left alone
    pub(crate) async fn mark_negotiating(&self) {
        let mut state = self.state.write().await;
        if matches!(*state, ConnectionState::New | ConnectionState::Failed) {
            debug!(
                user_id = %self.user_id,
                connection_id = %self.connection_id,
                from = ?*state,
                "negotiation started"
            );
            *state = ConnectionState::Negotiating;
        }
    }

    /// Feed an inbound negotiation signal into the transport
    pub(crate) async fn apply_signal(&self, payload: SignalPayload) -> Result<()> {
        self.mark_negotiating().await;
        self.handle.apply_signal(payload).await
    }

    /// Kick off the offer flow
    pub(crate) async fn start_negotiation(&self) -> Result<()> {
        self.mark_negotiating().await;
        self.handle.start_negotiation().await
    }

    /// Attach a local track for sending and remember it by kind
    pub(crate) async fn attach_track(&self, track: MediaTrack) -> Result<()> {
        self.handle.attach_track(track.clone()).await?;
        self.outbound_tracks.write().await.insert(track.kind(), track);
        Ok(())
    }

    /// Swap the outbound track of a kind in place, without renegotiation
    pub(crate) async fn replace_track(&self, kind: TrackKind, track: MediaTrack) -> Result<()> {
        self.handle.replace_outbound_track(kind, track.clone()).await?;
        self.outbound_tracks.write().await.insert(kind, track);
        Ok(())
    }

    /// Outbound track currently attached for a kind, if any
    pub async fn outbound_track(&self, kind: TrackKind) -> Option<MediaTrack> {
        self.outbound_tracks.read().await.get(&kind).cloned()
    }

    pub(crate) async fn signaling_stable(&self) -> bool {
        self.handle.signaling_stable().await
    }

    /// Close the transport; the state becomes Closed and stays there
    pub(crate) async fn close(&self) {
        self.set_state(ConnectionState::Closed).await;
        self.handle.close().await;
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("user_id", &self.user_id)
            .field("connection_id", &self.connection_id)
            .field("role", &self.role)
            .field("retry_count", &self.retry_count())
            .finish_non_exhaustive()
    }
}
