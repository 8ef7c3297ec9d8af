//! Follower-side handshake and acknowledgement frames.

use std::io::{Read, Write};

use mfly_common::error::{MflyError, MflyResult};
use mfly_protocol::{FrameReader, WireValue};

/// Result of one completed handshake with the leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// Replication id announced by `FULLRESYNC`.
    pub replication_id: String,
    /// Leader offset announced by `FULLRESYNC`.
    pub leader_offset: u64,
    /// Full-state snapshot payload shipped after `FULLRESYNC`.
    pub snapshot: Vec<u8>,
}

/// Drives the outbound handshake over an established leader connection.
///
/// Stages: `PING` awaiting `+PONG`, `REPLCONF listening-port` and `REPLCONF capa psync2` each
/// awaiting `+OK`, `PSYNC ? -1` awaiting `+FULLRESYNC <id> <offset>`, then one headless bulk
/// carrying the snapshot. On success the reader's consumed-byte counter is reset to zero, so
/// every later `REPLCONF ACK` reports exactly the post-handshake traffic.
///
/// # Errors
///
/// Returns `MflyError::InvalidState` when the leader replies out of protocol, or the
/// underlying decode/transport error.
pub fn perform_handshake<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut W,
    listening_port: u16,
) -> MflyResult<HandshakeOutcome> {
    send_request(writer, &[b"PING"])?;
    expect_simple_reply(reader, "PONG", "leader did not answer PING with PONG")?;

    let port_text = listening_port.to_string();
    send_request(writer, &[b"REPLCONF", b"listening-port", port_text.as_bytes()])?;
    expect_simple_reply(reader, "OK", "leader rejected REPLCONF listening-port")?;

    send_request(writer, &[b"REPLCONF", b"capa", b"psync2"])?;
    expect_simple_reply(reader, "OK", "leader rejected REPLCONF capa")?;

    send_request(writer, &[b"PSYNC", b"?", b"-1"])?;
    let resync = read_simple_reply(reader, "leader did not announce FULLRESYNC")?;
    let (replication_id, leader_offset) = parse_fullresync(&resync)?;

    let WireValue::BulkString(snapshot) = reader.read_value()? else {
        return Err(MflyError::InvalidState(
            "leader did not ship a snapshot payload after FULLRESYNC",
        ));
    };

    reader.reset_consumed();
    Ok(HandshakeOutcome {
        replication_id,
        leader_offset,
        snapshot,
    })
}

/// Builds the `REPLCONF ACK <offset>` reply for one `GETACK` request.
#[must_use]
pub fn ack_frame(offset: u64) -> WireValue {
    let offset_text = offset.to_string();
    WireValue::command(&[b"REPLCONF", b"ACK", offset_text.as_bytes()])
}

/// Whether one decoded frame is a `REPLCONF GETACK` request from the leader.
#[must_use]
pub fn is_getack_request(value: &WireValue) -> bool {
    let WireValue::Array(items) = value else {
        return false;
    };
    let command_matches = items
        .first()
        .and_then(WireValue::as_text)
        .is_some_and(|name| name.eq_ignore_ascii_case("REPLCONF"));
    let subcommand_matches = items
        .get(1)
        .and_then(WireValue::as_text)
        .is_some_and(|name| name.eq_ignore_ascii_case("GETACK"));
    command_matches && subcommand_matches
}

fn send_request<W: Write>(writer: &mut W, parts: &[&[u8]]) -> MflyResult<()> {
    writer.write_all(&WireValue::command(parts).to_bytes())?;
    Ok(())
}

fn read_simple_reply<R: Read>(
    reader: &mut FrameReader<R>,
    context: &'static str,
) -> MflyResult<String> {
    match reader.read_value()? {
        WireValue::SimpleString(reply) => Ok(reply),
        _ => Err(MflyError::InvalidState(context)),
    }
}

fn expect_simple_reply<R: Read>(
    reader: &mut FrameReader<R>,
    expected: &str,
    context: &'static str,
) -> MflyResult<()> {
    let reply = read_simple_reply(reader, context)?;
    if reply.eq_ignore_ascii_case(expected) {
        return Ok(());
    }
    Err(MflyError::InvalidState(context))
}

fn parse_fullresync(reply: &str) -> MflyResult<(String, u64)> {
    let mut tokens = reply.split(' ');
    let keyword = tokens.next().unwrap_or_default();
    if !keyword.eq_ignore_ascii_case("FULLRESYNC") {
        return Err(MflyError::InvalidState(
            "leader did not announce FULLRESYNC",
        ));
    }
    let Some(replication_id) = tokens.next() else {
        return Err(MflyError::InvalidState(
            "FULLRESYNC reply is missing the replication id",
        ));
    };
    let offset = tokens
        .next()
        .and_then(|token| token.parse::<u64>().ok())
        .ok_or(MflyError::InvalidState(
            "FULLRESYNC reply is missing the leader offset",
        ))?;
    Ok((replication_id.to_owned(), offset))
}
