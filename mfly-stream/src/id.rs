//! Stream entry identifiers.

use thiserror::Error;

/// Errors produced by ID parsing and the append contract.
///
/// The display strings are user-visible wire literals (the dispatcher prefixes `ERR `).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// Append would reuse the reserved zero ID.
    #[error("The ID specified in XADD must be greater than 0-0")]
    IdIsZero,

    /// Append would move the stream top backwards or stand still.
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    IdNotMonotonic,

    /// The ID text does not follow the `<ms>-<seq>` grammar.
    #[error("Invalid stream ID specified as stream command argument")]
    MalformedId,
}

/// One stream entry ID, totally ordered lexicographically on `(ms, seq)`.
///
/// The default value is the reserved `0-0`, the top item of an empty stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    /// Millisecond component.
    pub ms: u64,
    /// Sequence component within one millisecond.
    pub seq: u64,
}

impl StreamId {
    /// The reserved smallest ID, never stored in a stream.
    pub const ZERO: Self = Self { ms: 0, seq: 0 };

    /// Creates an ID from its two components.
    #[must_use]
    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Parses one ID expression against the stream's current top item.
    ///
    /// `*` takes the wall-clock millisecond (`now_ms`) with a fresh or bumped sequence;
    /// `<ms>-*` auto-fills the sequence relative to `last_id`; `<ms>-<seq>` is taken as given.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MalformedId`] for anything else, including a bare numeric
    /// component without a `-` separator.
    pub fn parse(text: &str, last_id: Self, now_ms: u64) -> Result<Self, StreamError> {
        if text == "*" {
            if now_ms == last_id.ms {
                return Ok(Self::new(last_id.ms, last_id.seq.saturating_add(1)));
            }
            return Ok(Self::new(now_ms, 0));
        }

        let Some((ms_text, seq_text)) = text.split_once('-') else {
            return Err(StreamError::MalformedId);
        };
        let Ok(ms) = ms_text.parse::<u64>() else {
            return Err(StreamError::MalformedId);
        };
        if seq_text == "*" {
            if ms == last_id.ms {
                return Ok(Self::new(ms, last_id.seq.saturating_add(1)));
            }
            return Ok(Self::new(ms, 0));
        }
        let Ok(seq) = seq_text.parse::<u64>() else {
            return Err(StreamError::MalformedId);
        };
        Ok(Self::new(ms, seq))
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}
