//! Core lanbeacon primitives: the wire packet, per-peer liveness records,
//! and the IPv4 directed-broadcast resolver.
//!
//! Everything in this crate is pure data manipulation; the async engine
//! that moves packets around lives in `lanbeacon-network`. Timestamps are
//! always passed in by the caller, which keeps the liveness bookkeeping
//! deterministic under test.
//
// Modules
pub mod broadcast;
pub mod packet;
pub mod peer;
pub mod peer_address;

pub use broadcast::{broadcast_from_cidr, broadcast_from_parts, BroadcastError};
pub use packet::{Packet, PacketError, MAX_PACKET_SIZE};
pub use peer::Peer;
pub use peer_address::{PeerAddress, LAST_PING_CAPACITY};
