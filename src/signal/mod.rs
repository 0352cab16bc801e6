//! Signal protocol types, early-signal buffering, and routing

pub mod pending;
pub mod protocol;
pub mod router;

pub use pending::PendingSignals;
pub use protocol::{RoomEvent, SignalKind, SignalPayload};
pub use router::{InboundDisposition, SignalRouter};
