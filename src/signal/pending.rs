//! Buffer for signals that arrive before their peer connection exists

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::signal::protocol::SignalPayload;

/// Per-participant queues of early signals, in arrival order
///
/// Entries exist only while no connection is registered for the id; the
/// registry drains a queue atomically when it creates the connection.
#[derive(Debug, Default)]
pub struct PendingSignals {
    queues: RwLock<HashMap<String, Vec<SignalPayload>>>,
}

impl PendingSignals {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a signal to the participant's queue
    pub async fn push(&self, user_id: &str, payload: SignalPayload) {
        let mut queues = self.queues.write().await;
        let queue = queues.entry(user_id.to_string()).or_default();
        queue.push(payload);
        debug!(
            user_id = %user_id,
            buffered = queue.len(),
            "buffered signal for peer without connection"
        );
    }

    /// Remove and return the participant's queue, in arrival order
    pub async fn take(&self, user_id: &str) -> Vec<SignalPayload> {
        self.queues
            .write()
            .await
            .remove(user_id)
            .unwrap_or_default()
    }

    /// Drop the participant's queue
    pub async fn clear(&self, user_id: &str) {
        self.queues.write().await.remove(user_id);
    }

    /// Drop every queue
    pub async fn clear_all(&self) {
        self.queues.write().await.clear();
    }

    /// Number of buffered signals for one participant
    pub async fn len(&self, user_id: &str) -> usize {
        self.queues
            .read()
            .await
            .get(user_id)
            .map_or(0, Vec::len)
    }

    /// Whether no signals are buffered at all
    pub async fn is_empty(&self) -> bool {
        self.queues.read().await.is_empty()
    }
}
