//! Leader-side replication command handlers.

use mfly_common::error::MflyResult;
use mfly_protocol::{CommandFrame, WireValue};
use mfly_replication::wait_for_acked_replicas;
use mfly_storage::empty_snapshot;

use super::handlers_string::{not_integer_reply, parse_u64_arg};
use super::{ConnectionSession, ReplySink, ServerApp, ServerRole};

fn leader_only_reply(command: &str) -> WireValue {
    WireValue::Error(format!("ERR {command} is only valid on a leader node"))
}

pub(super) fn handle_replconf(
    app: &ServerApp,
    session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    if frame.arg_matches(0, b"ACK") && frame.args.len() == 2 {
        // Replica control frame: recorded silently, never answered.
        let Some(offset) = parse_u64_arg(&frame.args[1]) else {
            eprintln!("ignoring REPLCONF ACK with unparsable offset");
            return Ok(());
        };
        if let Some(link_id) = session.replica_link
            && let Some(mut leader) = app.leader_guard()
        {
            leader.record_ack(link_id, offset);
        }
        return Ok(());
    }

    // Handshake control frames (listening-port, capa, ...) are acknowledged blindly.
    sink.send_value(&WireValue::SimpleString("OK".to_owned()))
}

pub(super) fn handle_psync(
    app: &ServerApp,
    session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let _requested_replid = &frame.args[0];
    let _requested_offset = &frame.args[1];
    let ServerRole::Leader(_) = app.role() else {
        return sink.send_value(&leader_only_reply("PSYNC"));
    };

    let (replication_id, offset) = {
        let Some(leader) = app.leader_guard() else {
            unreachable!("leader role must carry leader state");
        };
        (leader.replication_id().to_owned(), leader.offset())
    };

    sink.send_value(&WireValue::SimpleString(format!(
        "FULLRESYNC {replication_id} {offset}"
    )))?;
    sink.send_raw(&WireValue::RawBulk(empty_snapshot()).to_bytes())?;

    // From here on this connection is a replica link; its write half feeds the fan-out lane
    // and further inbound frames are control frames.
    if let Some(writer) = session.take_replica_writer()
        && let Some(mut leader) = app.leader_guard()
    {
        session.replica_link = Some(leader.register_replica(writer));
    }
    Ok(())
}

pub(super) fn handle_wait(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let (Some(required), Some(timeout_ms)) = (
        parse_u64_arg(&frame.args[0]),
        parse_u64_arg(&frame.args[1]),
    ) else {
        return sink.send_value(&not_integer_reply());
    };
    let ServerRole::Leader(leader) = app.role() else {
        return sink.send_value(&leader_only_reply("WAIT"));
    };

    let getack_frame = WireValue::command(&[b"REPLCONF", b"GETACK", b"*"]).to_bytes();
    let replicated = wait_for_acked_replicas(leader, required, timeout_ms, &getack_frame);
    sink.send_value(&WireValue::Integer(
        i64::try_from(replicated).unwrap_or(i64::MAX),
    ))
}
