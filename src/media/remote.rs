//! Accumulated remote media per participant

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::media::stream::{RemoteStream, RemoteTrack};

/// Map of participant id to the remote media received from them
#[derive(Debug, Default)]
pub struct RemoteMediaMap {
    streams: RwLock<HashMap<String, RemoteStream>>,
}

impl RemoteMediaMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming track; returns a snapshot of the participant's
    /// stream when the track was new, `None` when the id was already present
    pub async fn add_track(&self, user_id: &str, track: RemoteTrack) -> Option<RemoteStream> {
        let mut streams = self.streams.write().await;
        let stream = streams
            .entry(user_id.to_string())
            .or_insert_with(|| RemoteStream::new(user_id));
        if !stream.push(track.clone()) {
            debug!(
                user_id = %user_id,
                track_id = %track.id,
                "duplicate remote track ignored"
            );
            return None;
        }
        Some(stream.clone())
    }

    /// Snapshot of a participant's remote stream
    pub async fn get(&self, user_id: &str) -> Option<RemoteStream> {
        self.streams.read().await.get(user_id).cloned()
    }

    /// Drop a participant's remote media
    pub async fn remove(&self, user_id: &str) {
        self.streams.write().await.remove(user_id);
    }

    /// Drop everything
    pub async fn clear(&self) {
        self.streams.write().await.clear();
    }
}
