//! Reply sinks abstracting where command output goes.
//!
//! A socket-backed sink serves ordinary connections, a collecting sink buffers replies for
//! `EXEC`, and a discarding sink realizes the follower contract of executing replicated
//! commands without answering.

use std::io::Write;

use mfly_common::error::MflyResult;
use mfly_protocol::WireValue;

/// Destination for command replies.
pub(crate) trait ReplySink {
    /// Emits one encoded reply value.
    fn send_value(&mut self, value: &WireValue) -> MflyResult<()>;

    /// Emits pre-encoded bytes (the snapshot-transfer frame).
    fn send_raw(&mut self, bytes: &[u8]) -> MflyResult<()>;
}

/// Sink writing straight to one byte stream.
pub(crate) struct WriterSink<W> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> ReplySink for WriterSink<W> {
    fn send_value(&mut self, value: &WireValue) -> MflyResult<()> {
        self.writer.write_all(&value.to_bytes())?;
        Ok(())
    }

    fn send_raw(&mut self, bytes: &[u8]) -> MflyResult<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }
}

/// Sink buffering reply values in memory.
#[derive(Debug, Default)]
pub(crate) struct CollectingSink {
    replies: Vec<WireValue>,
}

impl CollectingSink {
    pub(crate) fn into_replies(self) -> Vec<WireValue> {
        self.replies
    }
}

impl ReplySink for CollectingSink {
    fn send_value(&mut self, value: &WireValue) -> MflyResult<()> {
        self.replies.push(value.clone());
        Ok(())
    }

    fn send_raw(&mut self, bytes: &[u8]) -> MflyResult<()> {
        self.replies.push(WireValue::RawBulk(bytes.to_vec()));
        Ok(())
    }
}

/// Sink that drops every reply.
#[derive(Debug, Default)]
pub(crate) struct DiscardSink;

impl ReplySink for DiscardSink {
    fn send_value(&mut self, _value: &WireValue) -> MflyResult<()> {
        Ok(())
    }

    fn send_raw(&mut self, _bytes: &[u8]) -> MflyResult<()> {
        Ok(())
    }
}
