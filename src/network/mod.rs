//! Network boundary
//!
//! Packet framing, the dispatch boundary between transport and handlers,
//! liveness probing, and the TCP plumbing that drives a session.

pub mod connection;
pub mod dispatcher;
pub mod liveness;
pub mod packet;

pub use dispatcher::{HandlerFailure, PacketHandler, PacketProcessor};
pub use liveness::{IdleKind, LivenessMonitor, PongHandler};
pub use packet::{FrameError, InPacket, Packet, PacketBuilder};
