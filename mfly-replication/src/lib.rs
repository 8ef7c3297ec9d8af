//! Leader/follower replication for `mayfly-rs`.
//!
//! The leader side tracks registered replica links, fans propagated frames out through
//! per-replica writer lanes, tallies acknowledged offsets, and backs the blocking `WAIT`
//! primitive. The follower side drives the outbound handshake state machine and the
//! byte-offset accounting behind `REPLCONF ACK`.

pub mod follower;
pub mod leader;

pub use follower::{HandshakeOutcome, ack_frame, is_getack_request, perform_handshake};
pub use leader::{LeaderState, wait_for_acked_replicas};
