//! Hot-path container aliases used by keyspace tables.
//!
//! Container choices stay centralized here so future allocator/container upgrades can be done
//! in one place without touching command logic modules.

use hashbrown::HashMap as HbMap;

/// Hot-path hash map used by the keyspace table.
pub type HotMap<K, V> = HbMap<K, V>;
