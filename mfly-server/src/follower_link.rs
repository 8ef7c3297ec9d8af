//! Follower-side leader link: handshake, silent replay, ACK emission.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use mfly_common::config::LeaderAddress;
use mfly_common::error::{MflyError, MflyResult};
use mfly_protocol::{FrameReader, WireValue};
use mfly_replication::{ack_frame, is_getack_request, perform_handshake};

use crate::app::{DiscardSink, ServerApp};

/// Runs the leader link until it fails or the leader closes it.
///
/// Link failures terminate only this task; the server keeps serving its own clients.
pub(crate) fn run_follower_link(app: &Arc<ServerApp>, leader: &LeaderAddress, listening_port: u16) {
    match follower_link_loop(app, leader, listening_port) {
        Ok(()) => println!("leader {leader} closed the replication link"),
        Err(error) => eprintln!("replication link to {leader} failed: {error}"),
    }
}

fn follower_link_loop(
    app: &Arc<ServerApp>,
    leader: &LeaderAddress,
    listening_port: u16,
) -> MflyResult<()> {
    let stream = TcpStream::connect((leader.host.as_str(), leader.port))
        .map_err(|error| MflyError::Io(format!("failed to connect to leader {leader}: {error}")))?;
    let mut writer = stream.try_clone()?;
    let mut reader = FrameReader::new(stream);
    replay_leader_stream(app, &mut reader, &mut writer, listening_port)
}

/// Performs the handshake, applies the snapshot, then replays leader traffic silently.
///
/// Every replayed command executes against a discarding sink. `REPLCONF GETACK` is the one
/// exception: it is answered with `REPLCONF ACK <n>` where `n` counts every byte consumed
/// since the handshake completed, including the GETACK request itself.
pub(crate) fn replay_leader_stream<R: Read, W: Write>(
    app: &Arc<ServerApp>,
    reader: &mut FrameReader<R>,
    writer: &mut W,
    listening_port: u16,
) -> MflyResult<()> {
    let outcome = perform_handshake(reader, writer, listening_port)?;
    println!(
        "handshake with leader completed, replication id {}",
        outcome.replication_id
    );
    match app.apply_snapshot_payload(&outcome.snapshot) {
        Ok(loaded) => println!("applied full-state snapshot with {loaded} keys"),
        Err(error) => eprintln!("failed to apply leader snapshot: {error}"),
    }

    let mut session = app.new_session(None);
    let mut sink = DiscardSink;
    loop {
        let value = match reader.read_value() {
            Ok(value) => value,
            Err(MflyError::ConnectionClosed) => return Ok(()),
            Err(error) => return Err(error),
        };
        if is_getack_request(&value) {
            let ack = ack_frame(reader.consumed());
            writer.write_all(&ack.to_bytes())?;
            continue;
        }
        if !matches!(value, WireValue::Array(_)) {
            continue;
        }
        if matches!(&value, WireValue::Array(items) if items.is_empty()) {
            continue;
        }
        app.execute_frame(&mut session, &value, &mut sink)?;
    }
}
