//! Configuration types for the room orchestrator

use serde::{Deserialize, Serialize};

/// Main configuration for a [`RoomOrchestrator`](crate::RoomOrchestrator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Room identifier this orchestrator manages
    pub room_id: String,

    /// Local participant id (stable and unique within the room)
    pub local_user_id: String,

    /// ICE server configuration for peer connections
    pub ice: IceConfig,

    /// Maximum peers in the mesh (default: 10, max: 10)
    pub max_peers: u32,

    /// Maximum reconnection cycles per peer before giving up (default: 3)
    pub max_reconnect_cycles: u32,
}

/// ICE server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            room_id: "default-room".to_string(),
            local_user_id: format!("peer-{}", uuid::Uuid::new_v4()),
            ice: IceConfig::default(),
            max_peers: 10,
            max_reconnect_cycles: 3,
        }
    }
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `room_id` or `local_user_id` is empty
    /// - `stun_servers` is empty
    /// - `max_peers` is not in range 1-10
    /// - `max_reconnect_cycles` is greater than 10
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.room_id.is_empty() {
            return Err(Error::InvalidConfig("room_id must not be empty".to_string()));
        }

        if self.local_user_id.is_empty() {
            return Err(Error::InvalidConfig(
                "local_user_id must not be empty".to_string(),
            ));
        }

        if self.ice.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.max_peers == 0 || self.max_peers > 10 {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-10, got {}",
                self.max_peers
            )));
        }

        if self.max_reconnect_cycles > 10 {
            return Err(Error::InvalidConfig(format!(
                "max_reconnect_cycles must be at most 10, got {}",
                self.max_reconnect_cycles
            )));
        }

        Ok(())
    }
}
