//! RESP wire protocol model for `mayfly-rs`.
//!
//! The protocol is byte-framed and CRLF-terminated; the first byte of a frame selects the
//! shape. [`value::WireValue`] models the value sum type with its encoding, and
//! [`decode::FrameReader`] decodes frames from a byte source while tracking a running
//! consumed-byte count (the follower's replication offset is exactly that count).

pub mod decode;
pub mod frame;
pub mod value;

pub use decode::FrameReader;
pub use frame::CommandFrame;
pub use value::WireValue;
