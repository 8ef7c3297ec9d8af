//! Shared error model for cross-crate APIs.

use thiserror::Error;

/// Unified result type used by all public interfaces in `mayfly-rs`.
pub type MflyResult<T> = Result<T, MflyError>;

/// High-level error categories shared by protocol, storage, replication, and server crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MflyError {
    /// Configuration is invalid for the requested operation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Runtime state does not allow this operation.
    #[error("invalid runtime state: {0}")]
    InvalidState(&'static str),

    /// Wire or snapshot payload is malformed or semantically invalid.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket or filesystem I/O failed.
    #[error("io error: {0}")]
    Io(String),

    /// The peer closed its end of the connection between frames.
    #[error("connection closed by peer")]
    ConnectionClosed,
}

impl From<std::io::Error> for MflyError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}
