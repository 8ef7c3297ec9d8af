//! Append-only stream engine keyed by `(ms, seq)` IDs.
//!
//! Each stream indexes its entries in a compressed radix trie over the decimal
//! `"<ms>-<seq>"` representation, giving O(|id|) appends and lexicographic range scans.
//! Appends are strictly monotonic: every accepted ID is greater than the current top item.

pub mod id;
pub mod tree;

pub use id::{StreamError, StreamId};
pub use tree::{FieldPair, RangeMatch};

use tree::{Entry, RadixNode};

/// Lower range sentinel meaning "from the beginning".
pub const RANGE_START_SENTINEL: &str = "-";
/// Upper range sentinel meaning "to the end".
pub const RANGE_END_SENTINEL: &str = "+";

/// One per-key append-only stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stream {
    root: RadixNode,
    last_id: StreamId,
    length: u64,
}

impl Stream {
    /// Creates an empty stream with top item `0-0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry, resolving auto-fill ID expressions against the current top item.
    ///
    /// Returns the canonical `<ms>-<seq>` string of the accepted ID.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MalformedId`] for unparsable expressions,
    /// [`StreamError::IdIsZero`] for `0-0`, and [`StreamError::IdNotMonotonic`] when the
    /// resolved ID does not exceed the current top item.
    pub fn append(
        &mut self,
        id_text: &str,
        fields: Vec<FieldPair>,
        now_ms: u64,
    ) -> Result<String, StreamError> {
        let id = StreamId::parse(id_text, self.last_id, now_ms)?;
        if id == StreamId::ZERO {
            return Err(StreamError::IdIsZero);
        }
        if id <= self.last_id {
            return Err(StreamError::IdNotMonotonic);
        }

        let canonical = id.to_string();
        self.root.insert(canonical.as_bytes(), Entry { id, fields });
        self.last_id = id;
        self.length = self.length.saturating_add(1);
        Ok(canonical)
    }

    /// Returns all entries with ID string between `start` and `end`, inclusive on both sides.
    ///
    /// `-` and `+` are the unbounded sentinels. Results ascend lexicographically by ID string.
    #[must_use]
    pub fn range(&self, start: &str, end: &str) -> Vec<RangeMatch> {
        let min = (start != RANGE_START_SENTINEL).then_some(start.as_bytes());
        let max = (end != RANGE_END_SENTINEL).then_some(end.as_bytes());
        let mut matches = Vec::new();
        self.root.collect_between(min, max, &mut matches);
        matches
    }

    /// Returns all entries with ID string strictly greater than `after`.
    #[must_use]
    pub fn read_after(&self, after: &str) -> Vec<RangeMatch> {
        let mut matches = Vec::new();
        self.root
            .collect_between(Some(after.as_bytes()), None, &mut matches);
        matches.retain(|entry| entry.id != after);
        matches
    }

    /// Current top item ID (`0-0` for an empty stream).
    #[must_use]
    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the stream holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
