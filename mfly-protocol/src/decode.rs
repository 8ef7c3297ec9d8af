//! Buffered frame decoder with consumed-byte accounting.

use std::io::Read;

use mfly_common::error::{MflyError, MflyResult};

use crate::value::{
    ARRAY_BYTE, BULK_STRING_BYTE, ERROR_BYTE, INTEGER_BYTE, SIMPLE_STRING_BYTE, WireValue,
};

const READ_CHUNK_BYTES: usize = 8192;

/// Streaming RESP decoder over one byte source.
///
/// Every byte pulled out of the source increments a running counter; a follower reports that
/// counter in `REPLCONF ACK`, so the count must be exact at frame granularity. The counter can
/// be reset once (at the end of the replication handshake) without disturbing buffered bytes.
#[derive(Debug)]
pub struct FrameReader<R> {
    source: R,
    buffer: Vec<u8>,
    position: usize,
    consumed: u64,
}

impl<R: Read> FrameReader<R> {
    /// Wraps one byte source.
    pub fn new(source: R) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            position: 0,
            consumed: 0,
        }
    }

    /// Total bytes consumed since construction or the last [`Self::reset_consumed`].
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Rewinds the consumed-byte counter to zero.
    pub fn reset_consumed(&mut self) {
        self.consumed = 0;
    }

    /// Decodes the next complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`MflyError::ConnectionClosed`] when the source ends cleanly between frames,
    /// [`MflyError::Protocol`] for malformed frames or mid-frame EOF, and [`MflyError::Io`]
    /// when the underlying read fails.
    pub fn read_value(&mut self) -> MflyResult<WireValue> {
        if !self.fill_buffer()? {
            return Err(MflyError::ConnectionClosed);
        }
        self.read_value_inner()
    }

    fn read_value_inner(&mut self) -> MflyResult<WireValue> {
        let first = self.read_byte()?;
        match first {
            SIMPLE_STRING_BYTE => {
                let line = self.read_line()?;
                Ok(WireValue::SimpleString(into_utf8(line)?))
            }
            ERROR_BYTE => {
                let line = self.read_line()?;
                Ok(WireValue::Error(into_utf8(line)?))
            }
            INTEGER_BYTE => {
                let line = self.read_line()?;
                let text = into_utf8(line)?;
                let value = text
                    .parse::<i64>()
                    .map_err(|_| MflyError::Protocol(format!("invalid integer payload: {text}")))?;
                Ok(WireValue::Integer(value))
            }
            BULK_STRING_BYTE => self.read_bulk(),
            ARRAY_BYTE => {
                let length = self.read_length_line()?;
                let capacity = usize::try_from(length.max(0)).unwrap_or(0).min(64);
                let mut items = Vec::with_capacity(capacity);
                for _ in 0..length.max(0) {
                    items.push(self.read_value_inner()?);
                }
                Ok(WireValue::Array(items))
            }
            other => Err(MflyError::Protocol(format!(
                "unexpected frame type byte: 0x{other:02x}"
            ))),
        }
    }

    fn read_bulk(&mut self) -> MflyResult<WireValue> {
        let length = self.read_length_line()?;
        if length == -1 {
            return Ok(WireValue::NullBulk);
        }
        let length = usize::try_from(length)
            .map_err(|_| MflyError::Protocol(format!("invalid bulk length: {length}")))?;
        let mut payload = Vec::with_capacity(length.min(READ_CHUNK_BYTES));
        for _ in 0..length {
            payload.push(self.read_byte()?);
        }
        // The snapshot-transfer frame omits its terminator, so the trailing CRLF is optional.
        self.consume_optional_terminator()?;
        Ok(WireValue::BulkString(payload))
    }

    /// Consumes a trailing CRLF when one is present, one byte at a time.
    fn consume_optional_terminator(&mut self) -> MflyResult<()> {
        for expected in [b'\r', b'\n'] {
            match self.peek_byte()? {
                Some(byte) if byte == expected => {
                    let _ = self.read_byte()?;
                }
                _ => return Ok(()),
            }
        }
        Ok(())
    }

    fn read_length_line(&mut self) -> MflyResult<i64> {
        let line = self.read_line()?;
        let text = into_utf8(line)?;
        text.parse::<i64>()
            .map_err(|_| MflyError::Protocol(format!("invalid length payload: {text}")))
    }

    /// Reads bytes up to the next CRLF pair; lone CR or LF bytes stay part of the payload.
    fn read_line(&mut self) -> MflyResult<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte != b'\r' {
                line.push(byte);
                continue;
            }
            let next = self.read_byte()?;
            if next == b'\n' {
                return Ok(line);
            }
            line.push(byte);
            line.push(next);
        }
    }

    fn read_byte(&mut self) -> MflyResult<u8> {
        if !self.fill_buffer()? {
            return Err(MflyError::Protocol(
                "unexpected end of stream inside a frame".to_owned(),
            ));
        }
        let byte = self.buffer[self.position];
        self.position = self.position.saturating_add(1);
        self.consumed = self.consumed.saturating_add(1);
        Ok(byte)
    }

    fn peek_byte(&mut self) -> MflyResult<Option<u8>> {
        if !self.fill_buffer()? {
            return Ok(None);
        }
        Ok(Some(self.buffer[self.position]))
    }

    fn fill_buffer(&mut self) -> MflyResult<bool> {
        if self.position < self.buffer.len() {
            return Ok(true);
        }
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        loop {
            match self.source.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(read_len) => {
                    self.buffer.clear();
                    self.buffer.extend_from_slice(&chunk[..read_len]);
                    self.position = 0;
                    return Ok(true);
                }
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
                Err(error) => return Err(MflyError::Io(error.to_string())),
            }
        }
    }
}

fn into_utf8(line: Vec<u8>) -> MflyResult<String> {
    String::from_utf8(line)
        .map_err(|_| MflyError::Protocol("frame line is not valid UTF-8".to_owned()))
}
