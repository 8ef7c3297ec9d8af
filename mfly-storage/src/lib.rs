//! Keyspace and snapshot persistence for `mayfly-rs`.

pub mod containers;
pub mod crc64;
pub mod keyspace;
pub mod snapshot;

pub use keyspace::{Keyspace, KeyspaceError, StoredValue, ValueEntry};
pub use snapshot::{SnapshotSink, empty_snapshot, read_snapshot};
