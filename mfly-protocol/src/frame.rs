//! Canonical command frame extracted from a decoded request array.

use mfly_common::error::{MflyError, MflyResult};

use crate::value::WireValue;

/// One parsed client request.
///
/// `raw` is the canonical re-encoding of the request array. The leader propagates those exact
/// bytes to its replicas, and transactions queue them for later execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Command word as received (case preserved; dispatch folds it).
    pub name: String,
    /// Raw byte arguments preserving wire-level payload.
    pub args: Vec<Vec<u8>>,
    /// Canonical request bytes.
    pub raw: Vec<u8>,
}

impl CommandFrame {
    /// Creates a command frame from a name and argument list.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<Vec<u8>>) -> Self {
        let name = name.into();
        let mut parts: Vec<&[u8]> = vec![name.as_bytes()];
        parts.extend(args.iter().map(Vec::as_slice));
        let raw = WireValue::command(&parts).to_bytes();
        Self { name, args, raw }
    }

    /// Extracts a command frame from one decoded wire value.
    ///
    /// # Errors
    ///
    /// Returns `MflyError::Protocol` when the value is not a non-empty array of string-like
    /// elements.
    pub fn from_value(value: &WireValue) -> MflyResult<Self> {
        let WireValue::Array(items) = value else {
            return Err(MflyError::Protocol(
                "request frame must be an array".to_owned(),
            ));
        };
        let Some((head, tail)) = items.split_first() else {
            return Err(MflyError::Protocol(
                "request array must not be empty".to_owned(),
            ));
        };
        let Some(name) = head.as_text() else {
            return Err(MflyError::Protocol(
                "command word must be a UTF-8 string".to_owned(),
            ));
        };
        let mut args = Vec::with_capacity(tail.len());
        for item in tail {
            let Some(payload) = item.as_bytes_payload() else {
                return Err(MflyError::Protocol(
                    "command arguments must be string frames".to_owned(),
                ));
            };
            args.push(payload.to_vec());
        }
        Ok(Self {
            name: name.to_owned(),
            args,
            raw: value.to_bytes(),
        })
    }

    /// Command word folded to uppercase for registry lookup.
    #[must_use]
    pub fn canonical_name(&self) -> String {
        self.name.to_ascii_uppercase()
    }

    /// Case-insensitive match of one argument against an option keyword.
    #[must_use]
    pub fn arg_matches(&self, index: usize, keyword: &[u8]) -> bool {
        self.args
            .get(index)
            .is_some_and(|arg| arg.eq_ignore_ascii_case(keyword))
    }
}
