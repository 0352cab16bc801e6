//! Routing of negotiation signals between the signaling transport and peer
//! connections

use std::sync::Arc;

use tracing::debug;

use crate::peer::connection::ConnectionState;
use crate::peer::registry::PeerRegistry;
use crate::signal::pending::PendingSignals;
use crate::signal::protocol::{SignalKind, SignalPayload};
use crate::transport::SignalingSender;
use crate::{Error, Result};

/// What the router did with an inbound signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    /// Applied to an existing connection
    Applied,
    /// No connection yet and not an offer; buffered for replay
    Buffered,
    /// An offer for an unknown peer; the caller must create a Responder
    /// connection and apply the offer
    NeedsResponder,
    /// An answer while the transport was already stable; dropped
    DiscardedStale,
    /// The connection is closed; dropped
    IgnoredClosed,
}

/// Routes inbound signals to connections and outbound signals to the
/// signaling transport
pub struct SignalRouter {
    registry: Arc<PeerRegistry>,
    pending: Arc<PendingSignals>,
    signaling: Arc<dyn SignalingSender>,
}

impl SignalRouter {
    /// Create a router over the given registry and signaling transport
    pub fn new(
        registry: Arc<PeerRegistry>,
        pending: Arc<PendingSignals>,
        signaling: Arc<dyn SignalingSender>,
    ) -> Self {
        Self {
            registry,
            pending,
            signaling,
        }
    }

    /// Route one inbound signal from a remote participant
    pub async fn route_inbound(
        &self,
        from_user_id: &str,
        payload: &SignalPayload,
    ) -> Result<InboundDisposition> {
        match self.registry.get(from_user_id).await {
            Some(connection) => {
                if connection.state().await == ConnectionState::Closed {
                    debug!(
                        user_id = %from_user_id,
                        kind = ?payload.kind,
                        "signal for closed connection ignored"
                    );
                    return Ok(InboundDisposition::IgnoredClosed);
                }
                // An answer to an offer the current incarnation no longer has
                // in flight (e.g. sent to a predecessor) must not be applied.
                if payload.kind == SignalKind::Answer && connection.signaling_stable().await {
                    debug!(
                        user_id = %from_user_id,
                        connection_id = %connection.connection_id(),
                        "stale answer discarded"
                    );
                    return Ok(InboundDisposition::DiscardedStale);
                }
                connection.apply_signal(payload.clone()).await?;
                Ok(InboundDisposition::Applied)
            }
            None if payload.kind == SignalKind::Offer => Ok(InboundDisposition::NeedsResponder),
            None => {
                self.pending.push(from_user_id, payload.clone()).await;
                Ok(InboundDisposition::Buffered)
            }
        }
    }

    /// Forward a locally generated signal to one participant
    ///
    /// Fails fast when the signaling transport is disconnected.
    pub async fn forward_outbound(
        &self,
        target_user_id: &str,
        payload: SignalPayload,
    ) -> Result<()> {
        if !self.signaling.is_connected() {
            return Err(Error::SignalingUnavailable(format!(
                "cannot forward {:?} signal to {target_user_id}",
                payload.kind
            )));
        }
        self.signaling.send_signal(target_user_id, payload).await
    }
}
