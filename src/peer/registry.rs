//! Registry of active peer connections
//!
//! The registry is the only place connections are created or destroyed.
//! Creation and the drain of any buffered signals for the participant happen
//! under the same write lock, so an inbound signal racing the creation can
//! never land between the two.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::IceConfig;
use crate::media::remote::RemoteMediaMap;
use crate::peer::connection::{ConnectionState, PeerConnection, Role};
use crate::signal::pending::PendingSignals;
use crate::transport::{ConnectionEvents, ConnectionRequest, MediaConnector};
use crate::{Error, Result};

/// Result of a [`PeerRegistry::create`] call
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// A new connection was created
    Created(Arc<PeerConnection>),
    /// A connection already existed; creation was a no-op
    Existing(Arc<PeerConnection>),
}

impl CreateOutcome {
    /// The connection, whether new or pre-existing
    pub fn connection(&self) -> &Arc<PeerConnection> {
        match self {
            CreateOutcome::Created(conn) | CreateOutcome::Existing(conn) => conn,
        }
    }

    /// Whether a new connection was created
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Diagnostic snapshot of one registered connection
#[derive(Debug, Clone)]
pub struct PeerSummary {
    /// Participant id
    pub user_id: String,
    /// Lifecycle state at snapshot time
    pub state: ConnectionState,
    /// Negotiation role
    pub role: Role,
    /// Reconnection cycle of the current incarnation
    pub retry_count: u32,
}

/// Holds at most one [`PeerConnection`] per remote participant
pub struct PeerRegistry {
    connector: Arc<dyn MediaConnector>,
    events: ConnectionEvents,
    pending: Arc<PendingSignals>,
    remote_media: Arc<RemoteMediaMap>,
    ice: IceConfig,
    max_peers: u32,
    peers: RwLock<HashMap<String, Arc<PeerConnection>>>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new(
        connector: Arc<dyn MediaConnector>,
        events: ConnectionEvents,
        pending: Arc<PendingSignals>,
        remote_media: Arc<RemoteMediaMap>,
        ice: IceConfig,
        max_peers: u32,
    ) -> Self {
        Self {
            connector,
            events,
            pending,
            remote_media,
            ice,
            max_peers,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a connection; never creates one
    pub async fn get(&self, user_id: &str) -> Option<Arc<PeerConnection>> {
        self.peers.read().await.get(user_id).cloned()
    }

    /// Create a connection for a participant, or return the existing one
    ///
    /// Idempotent: a second call for the same id returns
    /// [`CreateOutcome::Existing`] without touching the transport. On
    /// creation any signals buffered for the id are replayed into the new
    /// connection, in arrival order, before the registry lock is released.
    pub async fn create(&self, user_id: &str, role: Role) -> Result<CreateOutcome> {
        let mut peers = self.peers.write().await;

        if let Some(existing) = peers.get(user_id) {
            debug!(
                user_id = %user_id,
                connection_id = %existing.connection_id(),
                "connection already registered"
            );
            return Ok(CreateOutcome::Existing(Arc::clone(existing)));
        }

        if peers.len() >= self.max_peers as usize {
            return Err(Error::PeerLimitExceeded(self.max_peers));
        }

        let connection_id = Uuid::new_v4().to_string();
        let request = ConnectionRequest {
            user_id: user_id.to_string(),
            connection_id: connection_id.clone(),
            role,
            ice: self.ice.clone(),
        };

        let handle = self
            .connector
            .create_connection(request, self.events.clone())
            .await?;
        let connection = Arc::new(PeerConnection::new(
            user_id.to_string(),
            connection_id.clone(),
            role,
            handle,
        ));
        peers.insert(user_id.to_string(), Arc::clone(&connection));

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            role = ?role,
            peers = peers.len(),
            "peer connection created"
        );

        // Replay buffered signals while still holding the registry lock so
        // no concurrent inbound signal can slot in between drain and apply.
        let buffered = self.pending.take(user_id).await;
        if !buffered.is_empty() {
            debug!(
                user_id = %user_id,
                count = buffered.len(),
                "replaying buffered signals"
            );
            for payload in buffered {
                if let Err(e) = connection.apply_signal(payload).await {
                    warn!(
                        user_id = %user_id,
                        error = %e,
                        "failed to replay buffered signal"
                    );
                }
            }
        }

        Ok(CreateOutcome::Created(connection))
    }

    /// Close and remove a participant's connection and its associated state
    ///
    /// Also clears the participant's pending-signal queue and remote media.
    /// Safe to call when no entry exists.
    pub async fn destroy(&self, user_id: &str) {
        let removed = self.peers.write().await.remove(user_id);
        self.pending.clear(user_id).await;
        self.remote_media.remove(user_id).await;

        if let Some(connection) = removed {
            info!(
                user_id = %user_id,
                connection_id = %connection.connection_id(),
                "peer connection destroyed"
            );
            connection.close().await;
        }
    }

    /// Close and remove every connection and all associated state
    pub async fn clear(&self) {
        let drained: Vec<_> = self.peers.write().await.drain().collect();
        for (_, connection) in &drained {
            connection.close().await;
        }
        self.pending.clear_all().await;
        self.remote_media.clear().await;
        if !drained.is_empty() {
            info!(closed = drained.len(), "all peer connections closed");
        }
    }

    /// Number of registered connections
    pub async fn count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Registered connections that are not closed
    pub async fn active(&self) -> Vec<Arc<PeerConnection>> {
        let peers: Vec<_> = self.peers.read().await.values().cloned().collect();
        let mut active = Vec::with_capacity(peers.len());
        for connection in peers {
            if connection.state().await != ConnectionState::Closed {
                active.push(connection);
            }
        }
        active
    }

    /// Diagnostic snapshot of every registered connection
    pub async fn summaries(&self) -> Vec<PeerSummary> {
        let peers: Vec<_> = self.peers.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(peers.len());
        for connection in peers {
            summaries.push(PeerSummary {
                user_id: connection.user_id().to_string(),
                state: connection.state().await,
                role: connection.role(),
                retry_count: connection.retry_count(),
            });
        }
        summaries
    }
}
