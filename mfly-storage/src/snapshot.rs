//! Binary snapshot codec.
//!
//! Layout: `REDIS` magic + 4-byte version, any number of `0xFA` auxiliary fields, any number
//! of `0xFE` database sections (`0xFB` resize hints, then entries with optional
//! `0xFD`-seconds / `0xFC`-milliseconds expiry), a `0xFF` end marker, and a CRC-64 trailer
//! over everything before it. Only the string value type (`0x00`) exists in this format.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mfly_common::error::{MflyError, MflyResult};

use crate::crc64;

const SNAPSHOT_MAGIC: &[u8; 5] = b"REDIS";
const SNAPSHOT_VERSION: &[u8; 4] = b"0011";
const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + SNAPSHOT_VERSION.len();

const AUX_SECTION_BYTE: u8 = 0xFA;
const RESIZE_HINT_BYTE: u8 = 0xFB;
const EXPIRE_MS_BYTE: u8 = 0xFC;
const EXPIRE_SECONDS_BYTE: u8 = 0xFD;
const DB_SECTION_BYTE: u8 = 0xFE;
const EOF_BYTE: u8 = 0xFF;
const STRING_VALUE_TYPE_BYTE: u8 = 0x00;

const LEN_KIND_MASK: u8 = 0b1100_0000;
const LEN_6BIT: u8 = 0b0000_0000;
const LEN_14BIT: u8 = 0b0100_0000;
const LEN_32BIT: u8 = 0b1000_0000;

const SPECIAL_INT8: u8 = 0x00;
const SPECIAL_INT16: u8 = 0x01;
const SPECIAL_INT32: u8 = 0x02;

/// Receiver for decoded snapshot content.
///
/// Entries whose expiry already passed are still reported; discarding them is the caller's
/// choice.
pub trait SnapshotSink {
    /// One auxiliary metadata field.
    fn aux_field(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// One key/value entry with its optional absolute expiry.
    fn db_entry(&mut self, key: Vec<u8>, value: Vec<u8>, expire_at: Option<SystemTime>);
}

/// Decodes one snapshot payload, feeding content into `sink`.
///
/// # Errors
///
/// Returns `MflyError::Protocol` when the payload is truncated, structurally invalid, or its
/// checksum does not match. A missing or all-zero checksum trailer is tolerated.
pub fn read_snapshot(payload: &[u8], sink: &mut dyn SnapshotSink) -> MflyResult<()> {
    let mut cursor = SnapshotCursor::new(payload);

    let header = cursor.read_slice(HEADER_LEN)?;
    if &header[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(snapshot_error("invalid snapshot magic"));
    }

    while cursor.peek_u8() == Some(AUX_SECTION_BYTE) {
        let _ = cursor.read_u8()?;
        let key = read_string(&mut cursor)?;
        let value = read_string(&mut cursor)?;
        sink.aux_field(key, value);
    }

    loop {
        match cursor.peek_u8() {
            Some(DB_SECTION_BYTE) => {
                let _ = cursor.read_u8()?;
                read_db_section(&mut cursor, sink)?;
            }
            Some(EOF_BYTE) => {
                let _ = cursor.read_u8()?;
                return verify_trailer(payload, &mut cursor);
            }
            Some(other) => {
                return Err(snapshot_error(format!(
                    "unexpected section byte 0x{other:02x}"
                )));
            }
            None => return Err(snapshot_error("missing end-of-file marker")),
        }
    }
}

fn read_db_section(cursor: &mut SnapshotCursor<'_>, sink: &mut dyn SnapshotSink) -> MflyResult<()> {
    let _db_index = cursor.read_u8()?;
    if cursor.read_u8()? != RESIZE_HINT_BYTE {
        return Err(snapshot_error("expected resize hint after db section byte"));
    }
    let _keyspace_size = read_length(cursor)?;
    let _expire_size = read_length(cursor)?;

    let mut expire_at: Option<SystemTime> = None;
    loop {
        match cursor.peek_u8() {
            Some(EXPIRE_SECONDS_BYTE) => {
                let _ = cursor.read_u8()?;
                let seconds = cursor.read_u32_le()?;
                expire_at = Some(UNIX_EPOCH + Duration::from_secs(u64::from(seconds)));
            }
            Some(EXPIRE_MS_BYTE) => {
                let _ = cursor.read_u8()?;
                let millis = cursor.read_u64_le()?;
                expire_at = Some(UNIX_EPOCH + Duration::from_millis(millis));
            }
            Some(STRING_VALUE_TYPE_BYTE) => {
                let _ = cursor.read_u8()?;
                let key = read_string(cursor)?;
                let value = read_string(cursor)?;
                sink.db_entry(key, value, expire_at.take());
            }
            Some(DB_SECTION_BYTE | EOF_BYTE) => return Ok(()),
            Some(other) => {
                return Err(snapshot_error(format!("unsupported value type: {other}")));
            }
            None => return Err(snapshot_error("missing end-of-file marker")),
        }
    }
}

/// Validates the 8-byte CRC trailer following the end marker.
fn verify_trailer(payload: &[u8], cursor: &mut SnapshotCursor<'_>) -> MflyResult<()> {
    let body_len = cursor.offset();
    let remaining = payload.len().saturating_sub(body_len);
    if remaining == 0 {
        return Ok(());
    }
    if remaining != 8 {
        return Err(snapshot_error(format!(
            "unexpected {remaining} byte checksum trailer"
        )));
    }

    let trailer = cursor.read_slice(8)?;
    if trailer.iter().all(|byte| *byte == 0) {
        return Ok(());
    }
    let mut stored = [0_u8; 8];
    stored.copy_from_slice(trailer);
    let computed = crc64::checksum(&payload[..body_len]);
    // The trailer is big-endian; legacy writers used the little-endian order.
    if computed == u64::from_be_bytes(stored) || computed == u64::from_le_bytes(stored) {
        return Ok(());
    }
    Err(snapshot_error("checksum mismatch"))
}

/// Synthesizes the canonical empty snapshot (header, fixed AUX map, end marker, checksum).
#[must_use]
pub fn empty_snapshot() -> Vec<u8> {
    let mut output = Vec::with_capacity(128);
    output.extend_from_slice(SNAPSHOT_MAGIC);
    output.extend_from_slice(SNAPSHOT_VERSION);
    write_aux_string(&mut output, b"redis-ver", b"7.2.0");
    write_aux_integer(&mut output, b"redis-bits", 64);
    write_aux_integer(&mut output, b"ctime", 1_829_289_061);
    write_aux_integer(&mut output, b"used-mem", 2_965_639_168);
    write_aux_integer(&mut output, b"aof-base", 0);
    output.push(EOF_BYTE);
    let trailer = crc64::checksum(&output);
    output.extend_from_slice(&trailer.to_be_bytes());
    output
}

fn write_aux_string(output: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    output.push(AUX_SECTION_BYTE);
    write_length_prefixed(output, key);
    write_length_prefixed(output, value);
}

fn write_aux_integer(output: &mut Vec<u8>, key: &[u8], value: u32) {
    output.push(AUX_SECTION_BYTE);
    write_length_prefixed(output, key);
    write_special_integer(output, value);
}

fn write_length_prefixed(output: &mut Vec<u8>, payload: &[u8]) {
    write_length(output, payload.len());
    output.extend_from_slice(payload);
}

fn write_length(output: &mut Vec<u8>, length: usize) {
    if length <= 0x3F {
        output.push(length as u8);
    } else if length <= 0x3FFF {
        output.push(LEN_14BIT | ((length >> 8) as u8));
        output.push((length & 0xFF) as u8);
    } else {
        output.push(LEN_32BIT);
        output.extend_from_slice(&(length as u32).to_be_bytes());
    }
}

fn write_special_integer(output: &mut Vec<u8>, value: u32) {
    if value <= 0xFF {
        output.push(LEN_KIND_MASK | SPECIAL_INT8);
        output.push(value as u8);
    } else if value <= 0xFFFF {
        output.push(LEN_KIND_MASK | SPECIAL_INT16);
        output.extend_from_slice(&(value as u16).to_be_bytes());
    } else {
        output.push(LEN_KIND_MASK | SPECIAL_INT32);
        output.extend_from_slice(&value.to_be_bytes());
    }
}

/// Decoded length-prefixed scalar.
enum LenEncoded {
    /// Plain payload length.
    Length(usize),
    /// Inline integer (rendered as its decimal string by `read_string`).
    Integer(i64),
}

fn read_length(cursor: &mut SnapshotCursor<'_>) -> MflyResult<LenEncoded> {
    let first = cursor.read_u8()?;
    match first & LEN_KIND_MASK {
        LEN_6BIT => Ok(LenEncoded::Length(usize::from(first & 0x3F))),
        LEN_14BIT => {
            let second = cursor.read_u8()?;
            Ok(LenEncoded::Length(
                (usize::from(first & 0x3F) << 8) | usize::from(second),
            ))
        }
        LEN_32BIT => {
            let length = cursor.read_u32_be()?;
            usize::try_from(length)
                .map(LenEncoded::Length)
                .map_err(|_| snapshot_error("length exceeds platform limits"))
        }
        _ => match first & 0x3F {
            SPECIAL_INT8 => {
                let value = cursor.read_u8()? as i8;
                Ok(LenEncoded::Integer(i64::from(value)))
            }
            SPECIAL_INT16 => Ok(LenEncoded::Integer(i64::from(cursor.read_i16_be()?))),
            SPECIAL_INT32 => Ok(LenEncoded::Integer(i64::from(cursor.read_i32_be()?))),
            other => Err(snapshot_error(format!(
                "unsupported string encoding: {other}"
            ))),
        },
    }
}

fn read_string(cursor: &mut SnapshotCursor<'_>) -> MflyResult<Vec<u8>> {
    match read_length(cursor)? {
        LenEncoded::Length(length) => Ok(cursor.read_slice(length)?.to_vec()),
        LenEncoded::Integer(value) => Ok(value.to_string().into_bytes()),
    }
}

fn snapshot_error(message: impl Into<String>) -> MflyError {
    MflyError::Protocol(format!("snapshot payload error: {}", message.into()))
}

/// Stateful byte reader that tracks decoding position for robust error messages.
#[derive(Debug)]
struct SnapshotCursor<'a> {
    payload: &'a [u8],
    offset: usize,
}

impl<'a> SnapshotCursor<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, offset: 0 }
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn peek_u8(&self) -> Option<u8> {
        self.payload.get(self.offset).copied()
    }

    fn read_u8(&mut self) -> MflyResult<u8> {
        let bytes = self.read_slice(1)?;
        Ok(bytes[0])
    }

    fn read_u32_le(&mut self) -> MflyResult<u32> {
        let bytes = self.read_slice(4)?;
        let mut array = [0_u8; 4];
        array.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(array))
    }

    fn read_u64_le(&mut self) -> MflyResult<u64> {
        let bytes = self.read_slice(8)?;
        let mut array = [0_u8; 8];
        array.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(array))
    }

    fn read_u32_be(&mut self) -> MflyResult<u32> {
        let bytes = self.read_slice(4)?;
        let mut array = [0_u8; 4];
        array.copy_from_slice(bytes);
        Ok(u32::from_be_bytes(array))
    }

    fn read_i16_be(&mut self) -> MflyResult<i16> {
        let bytes = self.read_slice(2)?;
        let mut array = [0_u8; 2];
        array.copy_from_slice(bytes);
        Ok(i16::from_be_bytes(array))
    }

    fn read_i32_be(&mut self) -> MflyResult<i32> {
        let bytes = self.read_slice(4)?;
        let mut array = [0_u8; 4];
        array.copy_from_slice(bytes);
        Ok(i32::from_be_bytes(array))
    }

    fn read_slice(&mut self, len: usize) -> MflyResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or_else(|| snapshot_error("offset overflow while decoding"))?;
        if end > self.payload.len() {
            return Err(snapshot_error(format!(
                "unexpected end of payload at byte offset {} while reading {len} bytes",
                self.offset
            )));
        }

        let bytes = &self.payload[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }
}
