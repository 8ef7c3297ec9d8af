//! Process-wide keyspace with typed values and lazy expiry.

use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use mfly_common::progress::ProgressWatcher;
use mfly_stream::{FieldPair, RangeMatch, Stream, StreamError, StreamId};
use thiserror::Error;

use crate::containers::HotMap;

/// Errors surfaced by keyspace operations.
///
/// Variant display strings are the user-visible literals; the dispatcher prefixes `ERR ` where
/// Redis does (the `WRONGTYPE` literal carries its own prefix).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KeyspaceError {
    /// Counter arithmetic over a non-integer value.
    #[error("value is not an integer or out of range")]
    NotInteger,

    /// Operation against an entry of the wrong type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// Stream append contract violation.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// One stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Binary-safe string payload.
    String(Vec<u8>),
    /// Append-only stream.
    Stream(Stream),
}

/// One keyed entry with optional absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    /// Stored payload.
    pub value: StoredValue,
    /// Absolute wall-clock expiry; `None` means the entry never expires.
    pub expire_at: Option<SystemTime>,
}

impl ValueEntry {
    /// Creates a string entry.
    #[must_use]
    pub fn new_string(value: Vec<u8>, expire_at: Option<SystemTime>) -> Self {
        Self {
            value: StoredValue::String(value),
            expire_at,
        }
    }

    fn is_expired(&self, now: SystemTime) -> bool {
        self.expire_at.is_some_and(|expire_at| expire_at <= now)
    }
}

/// Process-wide `key -> entry` mapping guarded by one mutex.
///
/// Every operation holds the lock only for the in-memory lookup/mutation; callers must never
/// perform I/O through these methods. Expired entries are purged lazily on access, which is
/// enough to make them observably absent.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: Mutex<HotMap<Vec<u8>, ValueEntry>>,
    append_signal: ProgressWatcher,
}

impl Keyspace {
    /// Creates an empty keyspace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Watcher published on every successful stream append, used by blocking reads.
    #[must_use]
    pub fn append_signal(&self) -> &ProgressWatcher {
        &self.append_signal
    }

    /// Stores a string value, replacing any previous entry.
    pub fn set_string(&self, key: &[u8], value: Vec<u8>, expire_at: Option<SystemTime>) {
        let mut entries = self.guard();
        entries.insert(key.to_vec(), ValueEntry::new_string(value, expire_at));
    }

    /// Reads a string value.
    ///
    /// # Errors
    ///
    /// Returns [`KeyspaceError::WrongType`] when the key holds a stream.
    pub fn get_string(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KeyspaceError> {
        let mut entries = self.guard();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(None),
            Some(ValueEntry {
                value: StoredValue::String(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(KeyspaceError::WrongType),
        }
    }

    /// Applies create-or-increment counter semantics and returns the new value.
    ///
    /// A missing key is treated as zero; existing expiry metadata is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`KeyspaceError::NotInteger`] when the current value is not a decimal integer
    /// or the increment overflows, and [`KeyspaceError::WrongType`] for stream entries.
    pub fn increment(&self, key: &[u8]) -> Result<i64, KeyspaceError> {
        let mut entries = self.guard();
        Self::purge_expired(&mut entries, key);

        let (current, expire_at) = match entries.get(key) {
            None => (0_i64, None),
            Some(ValueEntry {
                value: StoredValue::String(value),
                expire_at,
            }) => {
                let Some(current) = parse_counter(value) else {
                    return Err(KeyspaceError::NotInteger);
                };
                (current, *expire_at)
            }
            Some(_) => return Err(KeyspaceError::WrongType),
        };

        let Some(next) = current.checked_add(1) else {
            return Err(KeyspaceError::NotInteger);
        };
        entries.insert(
            key.to_vec(),
            ValueEntry::new_string(next.to_string().into_bytes(), expire_at),
        );
        Ok(next)
    }

    /// Reports the entry type as its `TYPE` reply word.
    #[must_use]
    pub fn type_of(&self, key: &[u8]) -> &'static str {
        let mut entries = self.guard();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            None => "none",
            Some(ValueEntry {
                value: StoredValue::String(_),
                ..
            }) => "string",
            Some(ValueEntry {
                value: StoredValue::Stream(_),
                ..
            }) => "stream",
        }
    }

    /// Snapshot of all live keys.
    #[must_use]
    pub fn keys_all(&self) -> Vec<Vec<u8>> {
        let now = SystemTime::now();
        let mut entries = self.guard();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.keys().cloned().collect()
    }

    /// Removes one entry; returns whether a live entry existed.
    pub fn remove(&self, key: &[u8]) -> bool {
        let mut entries = self.guard();
        Self::purge_expired(&mut entries, key);
        entries.remove(key).is_some()
    }

    /// Appends one entry to the stream at `key`, creating the stream when absent.
    ///
    /// Publishes the append signal on success.
    ///
    /// # Errors
    ///
    /// Returns [`KeyspaceError::WrongType`] when the key holds a string, or the underlying
    /// [`StreamError`] when the ID violates the append contract.
    pub fn stream_append(
        &self,
        key: &[u8],
        id_text: &str,
        fields: Vec<FieldPair>,
        now_ms: u64,
    ) -> Result<String, KeyspaceError> {
        let accepted = {
            let mut entries = self.guard();
            Self::purge_expired(&mut entries, key);
            let entry = entries.entry_ref(key).or_insert_with(|| ValueEntry {
                value: StoredValue::Stream(Stream::new()),
                expire_at: None,
            });
            let StoredValue::Stream(stream) = &mut entry.value else {
                return Err(KeyspaceError::WrongType);
            };
            stream.append(id_text, fields, now_ms)?
        };
        self.append_signal.publish_progress();
        Ok(accepted)
    }

    /// Runs an inclusive range query against the stream at `key`.
    ///
    /// A missing key yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`KeyspaceError::WrongType`] when the key holds a string.
    pub fn stream_range(
        &self,
        key: &[u8],
        start: &str,
        end: &str,
    ) -> Result<Vec<RangeMatch>, KeyspaceError> {
        self.with_stream(key, |stream| stream.range(start, end))
            .map(Option::unwrap_or_default)
    }

    /// Returns stream entries with ID strictly greater than `after`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyspaceError::WrongType`] when the key holds a string.
    pub fn stream_read_after(
        &self,
        key: &[u8],
        after: &str,
    ) -> Result<Vec<RangeMatch>, KeyspaceError> {
        self.with_stream(key, |stream| stream.read_after(after))
            .map(Option::unwrap_or_default)
    }

    /// Current top item of the stream at `key`; `0-0` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`KeyspaceError::WrongType`] when the key holds a string.
    pub fn stream_last_id(&self, key: &[u8]) -> Result<StreamId, KeyspaceError> {
        self.with_stream(key, Stream::last_id)
            .map(|last_id| last_id.unwrap_or(StreamId::ZERO))
    }

    fn with_stream<T>(
        &self,
        key: &[u8],
        operation: impl FnOnce(&Stream) -> T,
    ) -> Result<Option<T>, KeyspaceError> {
        let mut entries = self.guard();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(None),
            Some(ValueEntry {
                value: StoredValue::Stream(stream),
                ..
            }) => Ok(Some(operation(stream))),
            Some(_) => Err(KeyspaceError::WrongType),
        }
    }

    /// Installs one hydrated entry without touching expiry semantics.
    pub fn install_entry(&self, key: Vec<u8>, entry: ValueEntry) {
        let mut entries = self.guard();
        entries.insert(key, entry);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = SystemTime::now();
        let mut entries = self.guard();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.len()
    }

    /// Whether no live entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn guard(&self) -> MutexGuard<'_, HotMap<Vec<u8>, ValueEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn purge_expired(entries: &mut HotMap<Vec<u8>, ValueEntry>, key: &[u8]) {
        let now = SystemTime::now();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
    }
}

fn parse_counter(payload: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(payload).ok()?;
    text.parse::<i64>().ok()
}
