//! Local capture, remote media bookkeeping, and track synchronization

pub mod local;
pub mod remote;
pub mod stream;

pub use local::MediaTrackManager;
pub use remote::RemoteMediaMap;
pub use stream::{MediaStream, MediaTrack, RemoteStream, RemoteTrack, TrackKind, TrackSource};
