//! Peer connection state and registry

pub mod connection;
pub mod registry;

pub use connection::{ConnectionState, PeerConnection, Role};
pub use registry::{CreateOutcome, PeerRegistry, PeerSummary};
