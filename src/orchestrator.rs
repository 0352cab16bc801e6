//! Room-level orchestration of the full-mesh peer topology
//!
//! One [`RoomOrchestrator`] per joined room. Room events from the signaling
//! transport drive connection creation and teardown; a single internal pump
//! task consumes transport events from all connections over one channel, so
//! locally generated signals leave in generation order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::media::local::MediaTrackManager;
use crate::media::remote::RemoteMediaMap;
use crate::peer::connection::{ConnectionState, PeerConnection, Role};
use crate::peer::registry::{CreateOutcome, PeerRegistry, PeerSummary};
use crate::signal::pending::PendingSignals;
use crate::signal::protocol::{RoomEvent, SignalPayload};
use crate::signal::router::{InboundDisposition, SignalRouter};
use crate::transport::{
    ConnectionEvent, ConnectivityErrorKind, MediaConnector, MediaSource, RoomObserver,
    SignalingSender,
};
use crate::{Error, Result};

/// Orchestrates one peer connection per remote participant in a room
pub struct RoomOrchestrator {
    config: OrchestratorConfig,
    signaling: Arc<dyn SignalingSender>,
    observer: Arc<dyn RoomObserver>,
    registry: Arc<PeerRegistry>,
    router: SignalRouter,
    media: MediaTrackManager,
    remote_media: Arc<RemoteMediaMap>,
    /// Completed reconnection cycles per participant
    reconnect_cycles: RwLock<HashMap<String, u32>>,
    /// Participants already notified as unrecoverable
    exhausted: RwLock<HashSet<String>>,
    closed: AtomicBool,
}

impl RoomOrchestrator {
    /// Create an orchestrator and start its connection-event pump
    ///
    /// Must be called within a tokio runtime. The pump task holds only a
    /// weak reference and exits when the orchestrator is dropped.
    pub fn new(
        config: OrchestratorConfig,
        signaling: Arc<dyn SignalingSender>,
        connector: Arc<dyn MediaConnector>,
        media_source: Arc<dyn MediaSource>,
        observer: Arc<dyn RoomObserver>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingSignals::new());
        let remote_media = Arc::new(RemoteMediaMap::new());
        let registry = Arc::new(PeerRegistry::new(
            connector,
            events_tx,
            Arc::clone(&pending),
            Arc::clone(&remote_media),
            config.ice.clone(),
            config.max_peers,
        ));
        let router = SignalRouter::new(
            Arc::clone(&registry),
            Arc::clone(&pending),
            Arc::clone(&signaling),
        );
        let media = MediaTrackManager::new(media_source, Arc::clone(&signaling), Arc::clone(&registry));

        info!(
            room_id = %config.room_id,
            local_user_id = %config.local_user_id,
            "room orchestrator created"
        );

        let orchestrator = Arc::new(Self {
            config,
            signaling,
            observer,
            registry,
            router,
            media,
            remote_media,
            reconnect_cycles: RwLock::new(HashMap::new()),
            exhausted: RwLock::new(HashSet::new()),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(Self::event_pump(
            Arc::downgrade(&orchestrator),
            events_rx,
        ));

        Ok(orchestrator)
    }

    /// Room id this orchestrator manages
    pub fn room_id(&self) -> &str {
        &self.config.room_id
    }

    /// Whether the room has been left
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Handle one room event from the signaling transport
    ///
    /// Events arriving after [`leave`](Self::leave) are ignored.
    pub async fn handle_room_event(&self, event: RoomEvent) -> Result<()> {
        if self.is_closed() {
            debug!(?event, "room event ignored after leave");
            return Ok(());
        }
        match event {
            RoomEvent::UserJoined {
                user_id,
                display_name,
            } => {
                info!(
                    user_id = %user_id,
                    display_name = display_name.as_deref().unwrap_or(""),
                    "remote user joined"
                );
                self.connect_to(&user_id, Role::Initiator).await
            }
            RoomEvent::UserLeft { user_id } => self.handle_user_left(&user_id).await,
            RoomEvent::Signal {
                from_user_id,
                payload,
            } => self.handle_signal(&from_user_id, payload).await,
            RoomEvent::RoomEnded => {
                info!(room_id = %self.config.room_id, "room ended by server");
                self.leave().await
            }
        }
    }

    /// Create a connection to a participant and start it according to role
    ///
    /// Duplicate requests for a registered participant are logged and
    /// ignored. Local tracks are attached before negotiation starts, so the
    /// first offer or answer already describes them; readiness is awaited
    /// explicitly, never assumed on a timer.
    async fn connect_to(&self, user_id: &str, role: Role) -> Result<()> {
        if role == Role::Initiator && !self.signaling.is_connected() {
            return Err(Error::SignalingUnavailable(format!(
                "cannot initiate connection to {user_id}"
            )));
        }

        let connection = match self.registry.create(user_id, role).await? {
            CreateOutcome::Existing(_) => {
                debug!(user_id = %user_id, "duplicate peer ignored");
                return Ok(());
            }
            CreateOutcome::Created(connection) => connection,
        };

        // A capture failure must not tear down the connection being set up;
        // the peer simply starts without local media.
        if let Err(e) = self.media.acquire_stream().await {
            if e.is_media_error() {
                warn!(user_id = %user_id, error = %e, "connecting without local media");
            } else {
                return Err(e);
            }
        }
        for track in self.media.attachment_tracks().await {
            if let Err(e) = connection.attach_track(track).await {
                warn!(user_id = %user_id, error = %e, "failed to attach local track");
            }
        }

        // leave() may have raced the awaits above
        if self.is_closed() {
            self.registry.destroy(user_id).await;
            return Ok(());
        }

        if role == Role::Initiator {
            connection.start_negotiation().await?;
        }
        Ok(())
    }

    async fn handle_user_left(&self, user_id: &str) -> Result<()> {
        info!(user_id = %user_id, "remote user left");
        self.registry.destroy(user_id).await;
        self.clear_retry_state(user_id).await;
        self.observer.participant_removed(user_id);
        Ok(())
    }

    async fn handle_signal(&self, from_user_id: &str, payload: SignalPayload) -> Result<()> {
        let disposition = self.router.route_inbound(from_user_id, &payload).await?;
        match disposition {
            InboundDisposition::NeedsResponder => {
                self.connect_to(from_user_id, Role::Responder).await?;
                if self.is_closed() {
                    return Ok(());
                }
                // Buffered pre-offer candidates were already replayed during
                // creation; the triggering offer goes in last.
                match self.registry.get(from_user_id).await {
                    Some(connection) => connection.apply_signal(payload).await,
                    None => Ok(()),
                }
            }
            other => {
                debug!(
                    from_user_id = %from_user_id,
                    kind = ?payload.kind,
                    disposition = ?other,
                    "inbound signal routed"
                );
                Ok(())
            }
        }
    }

    /// Leave the room: one hard cancellation point
    ///
    /// Closes every connection, clears pending signals, retry bookkeeping
    /// and remote media, and stops every local track. Idempotent; any event
    /// arriving afterwards is a no-op.
    pub async fn leave(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(room_id = %self.config.room_id, "leaving room");
        self.registry.clear().await;
        self.reconnect_cycles.write().await.clear();
        self.exhausted.write().await.clear();
        self.media.release().await;
        Ok(())
    }

    /// Toggle the microphone across all connections
    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        if self.is_closed() {
            debug!("audio toggle ignored after leave");
            return Ok(());
        }
        self.media.set_audio_enabled(enabled).await
    }

    /// Toggle the camera across all connections
    pub async fn set_video_enabled(&self, enabled: bool) -> Result<()> {
        if self.is_closed() {
            debug!("video toggle ignored after leave");
            return Ok(());
        }
        self.media.set_video_enabled(enabled).await
    }

    /// Start screen sharing across all connections
    pub async fn start_screen_share(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.media.start_screen_share().await
    }

    /// Stop screen sharing and restore the camera
    pub async fn stop_screen_share(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.media.stop_screen_share().await
    }

    /// React to the share being revoked outside the app
    pub async fn screen_share_ended(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.media.screen_share_ended().await
    }

    /// Lifecycle state of one participant's connection
    pub async fn connection_state(&self, user_id: &str) -> Result<ConnectionState> {
        match self.registry.get(user_id).await {
            Some(connection) => Ok(connection.state().await),
            None => Err(Error::PeerNotFound(user_id.to_string())),
        }
    }

    /// Diagnostic snapshot of all registered connections
    pub async fn peers(&self) -> Vec<PeerSummary> {
        self.registry.summaries().await
    }

    async fn clear_retry_state(&self, user_id: &str) {
        self.reconnect_cycles.write().await.remove(user_id);
        self.exhausted.write().await.remove(user_id);
    }

    async fn event_pump(
        this: Weak<Self>,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(orchestrator) = this.upgrade() else {
                break;
            };
            if orchestrator.is_closed() {
                break;
            }
            if let Err(e) = orchestrator.handle_connection_event(event).await {
                warn!(error = %e, "connection event handling failed");
            }
        }
        debug!("connection event pump stopped");
    }

    async fn handle_connection_event(&self, event: ConnectionEvent) -> Result<()> {
        let user_id = event.user_id().to_string();
        let Some(connection) = self.registry.get(&user_id).await else {
            debug!(user_id = %user_id, "event for unregistered peer discarded");
            return Ok(());
        };
        // Events from a destroyed incarnation can still be in flight; the
        // generation tag tells them apart from the current connection's.
        if connection.connection_id() != event.connection_id() {
            debug!(
                user_id = %user_id,
                current = %connection.connection_id(),
                stale = %event.connection_id(),
                "stale connection event discarded"
            );
            return Ok(());
        }

        match event {
            ConnectionEvent::SignalOut { payload, .. } => {
                connection.mark_negotiating().await;
                self.router.forward_outbound(&user_id, payload).await
            }
            ConnectionEvent::Connected { .. } => {
                connection.set_state(ConnectionState::Connected).await;
                connection.reset_retries();
                self.clear_retry_state(&user_id).await;
                info!(user_id = %user_id, "peer connected");
                Ok(())
            }
            ConnectionEvent::Failed { .. } => self.handle_connection_failed(&user_id, connection).await,
            ConnectionEvent::RemoteTrack { track, .. } => {
                if let Some(stream) = self.remote_media.add_track(&user_id, track).await {
                    self.observer.participant_stream_updated(&user_id, stream);
                }
                Ok(())
            }
        }
    }

    /// Destroy the failed incarnation and re-initiate, up to the configured
    /// number of cycles; after that, notify the observer exactly once and
    /// leave the peer in Failed
    async fn handle_connection_failed(
        &self,
        user_id: &str,
        connection: Arc<PeerConnection>,
    ) -> Result<()> {
        connection.set_state(ConnectionState::Failed).await;

        let completed_cycles = {
            let cycles = self.reconnect_cycles.read().await;
            cycles.get(user_id).copied().unwrap_or(0)
        };
        if completed_cycles >= self.config.max_reconnect_cycles {
            let newly_exhausted = self.exhausted.write().await.insert(user_id.to_string());
            if newly_exhausted {
                warn!(
                    user_id = %user_id,
                    cycles = completed_cycles,
                    "reconnection attempts exhausted"
                );
                self.observer
                    .connectivity_error(user_id, ConnectivityErrorKind::RetriesExhausted);
            }
            return Err(Error::ConnectivityFailed {
                user_id: user_id.to_string(),
            });
        }

        let attempt = completed_cycles + 1;
        self.reconnect_cycles
            .write()
            .await
            .insert(user_id.to_string(), attempt);
        info!(
            user_id = %user_id,
            attempt,
            max = self.config.max_reconnect_cycles,
            "recreating failed connection"
        );

        self.registry.destroy(user_id).await;
        if self.is_closed() {
            return Ok(());
        }

        // Always re-initiate regardless of the original role; both sides
        // doing so yields crossed offers at worst, which resolve as glare.
        let outcome = self.registry.create(user_id, Role::Initiator).await?;
        if let CreateOutcome::Created(new_connection) = outcome {
            new_connection.set_retry_count(attempt);
            for track in self.media.attachment_tracks().await {
                if let Err(e) = new_connection.attach_track(track).await {
                    warn!(user_id = %user_id, error = %e, "failed to attach track on reconnect");
                }
            }
            if self.is_closed() {
                self.registry.destroy(user_id).await;
                return Ok(());
            }
            new_connection.start_negotiation().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RoomOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomOrchestrator")
            .field("room_id", &self.config.room_id)
            .field("local_user_id", &self.config.local_user_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
