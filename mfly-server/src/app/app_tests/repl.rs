use super::testkit::{SharedBuffer, parse_resp_integer, resp_command};
use super::{client, follower_app, leader_app};
use crate::app::DiscardSink;
use crate::follower_link::replay_leader_stream;
use crate::ingress::ingress_connection_bytes;
use googletest::prelude::*;
use mfly_protocol::{FrameReader, WireValue};
use mfly_storage::empty_snapshot;
use rstest::rstest;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn replica_session(app: &super::ServerApp, buffer: &SharedBuffer) -> super::ConnectionSession {
    app.new_session(Some(Box::new(buffer.clone())))
}

#[rstest]
fn psync_replies_fullresync_then_the_raw_snapshot_payload() {
    let app = leader_app();
    let buffer = SharedBuffer::default();
    let mut connection = replica_session(&app, &buffer);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"REPLCONF", b"listening-port", b"6380"]),
            resp_command(&[b"REPLCONF", b"capa", b"psync2"]),
            resp_command(&[b"PSYNC", b"?", b"-1"]),
        ]
        .concat(),
    )
    .expect("handshake must succeed");

    assert_that!(&replies[0], eq(&b"+OK\r\n".to_vec()));
    assert_that!(&replies[1], eq(&b"+OK\r\n".to_vec()));

    let resync = String::from_utf8_lossy(&replies[2]).to_string();
    assert_that!(resync.starts_with("+FULLRESYNC "), eq(true));
    assert_that!(resync.ends_with(" 0\r\n"), eq(true));
    // "+FULLRESYNC " + 40-char id + " 0\r\n"
    assert_that!(resync.len(), eq(12 + 40 + 4));

    assert_that!(
        &replies[3],
        eq(&WireValue::RawBulk(empty_snapshot()).to_bytes())
    );

    let leader = app.leader_guard().expect("leader role expected");
    assert_that!(leader.replica_count(), eq(1_usize));
}

#[rstest]
fn writes_propagate_to_registered_replicas_in_commit_order() {
    let app = leader_app();
    let buffer = SharedBuffer::default();
    let mut replica = replica_session(&app, &buffer);
    let _ = ingress_connection_bytes(&app, &mut replica, &resp_command(&[b"PSYNC", b"?", b"-1"]))
        .expect("PSYNC must succeed");

    let mut writer = client(&app);
    let _ = ingress_connection_bytes(
        &app,
        &mut writer,
        &[
            resp_command(&[b"SET", b"a", b"1"]),
            resp_command(&[b"INCR", b"a"]),
            resp_command(&[b"GET", b"a"]),
        ]
        .concat(),
    )
    .expect("writes must succeed");

    app.leader_guard().expect("leader role expected").flush_links();
    let propagated = buffer.contents();
    let set_frame = resp_command(&[b"SET", b"a", b"1"]);
    let incr_frame = resp_command(&[b"INCR", b"a"]);
    let mut expected = set_frame.clone();
    expected.extend_from_slice(&incr_frame);
    assert_that!(&propagated, eq(&expected));

    let offset = app.leader_guard().expect("leader role expected").offset();
    assert_that!(offset, eq((set_frame.len() + incr_frame.len()) as u64));
}

#[rstest]
fn failed_writes_are_not_propagated() {
    let app = leader_app();
    let buffer = SharedBuffer::default();
    let mut replica = replica_session(&app, &buffer);
    let _ = ingress_connection_bytes(&app, &mut replica, &resp_command(&[b"PSYNC", b"?", b"-1"]))
        .expect("PSYNC must succeed");

    let mut writer = client(&app);
    let _ = ingress_connection_bytes(
        &app,
        &mut writer,
        &[
            resp_command(&[b"SET", b"word", b"abc"]),
            resp_command(&[b"INCR", b"word"]),
        ]
        .concat(),
    )
    .expect("commands must parse");

    app.leader_guard().expect("leader role expected").flush_links();
    assert_that!(&buffer.contents(), eq(&resp_command(&[b"SET", b"word", b"abc"])));
}

#[rstest]
fn replconf_ack_is_silent_and_satisfies_wait() {
    let app = leader_app();
    let buffer = SharedBuffer::default();
    let mut replica = replica_session(&app, &buffer);
    let _ = ingress_connection_bytes(&app, &mut replica, &resp_command(&[b"PSYNC", b"?", b"-1"]))
        .expect("PSYNC must succeed");

    let mut writer = client(&app);
    let _ = ingress_connection_bytes(&app, &mut writer, &resp_command(&[b"SET", b"a", b"1"]))
        .expect("SET must succeed");

    let ack_replies = ingress_connection_bytes(
        &app,
        &mut replica,
        &resp_command(&[b"REPLCONF", b"ACK", b"1048576"]),
    )
    .expect("ACK must parse");
    assert_that!(ack_replies.is_empty(), eq(true));

    let wait_replies = ingress_connection_bytes(&app, &mut writer, &resp_command(&[b"WAIT", b"1", b"200"]))
        .expect("WAIT must succeed");
    assert_that!(parse_resp_integer(&wait_replies[0]), eq(1_i64));
}

#[rstest]
fn wait_times_out_when_no_replica_acknowledges() {
    let app = leader_app();
    let buffer = SharedBuffer::default();
    let mut replica = replica_session(&app, &buffer);
    let _ = ingress_connection_bytes(&app, &mut replica, &resp_command(&[b"PSYNC", b"?", b"-1"]))
        .expect("PSYNC must succeed");

    let mut writer = client(&app);
    let _ = ingress_connection_bytes(&app, &mut writer, &resp_command(&[b"SET", b"a", b"1"]))
        .expect("SET must succeed");

    let started_at = Instant::now();
    let replies = ingress_connection_bytes(&app, &mut writer, &resp_command(&[b"WAIT", b"1", b"60"]))
        .expect("WAIT must succeed");
    assert_that!(parse_resp_integer(&replies[0]), eq(0_i64));
    assert_that!(started_at.elapsed() >= Duration::from_millis(60), eq(true));
    assert_that!(started_at.elapsed() < Duration::from_secs(5), eq(true));

    // The timed-out WAIT must still have solicited acknowledgements in FIFO order.
    app.leader_guard().expect("leader role expected").flush_links();
    let propagated = String::from_utf8_lossy(&buffer.contents()).to_string();
    assert_that!(propagated.contains("GETACK"), eq(true));
}

#[rstest]
fn wait_returns_the_replica_count_when_nothing_was_written() {
    let app = leader_app();
    let buffer = SharedBuffer::default();
    let mut replica = replica_session(&app, &buffer);
    let _ = ingress_connection_bytes(&app, &mut replica, &resp_command(&[b"PSYNC", b"?", b"-1"]))
        .expect("PSYNC must succeed");

    let mut writer = client(&app);
    let replies = ingress_connection_bytes(&app, &mut writer, &resp_command(&[b"WAIT", b"1", b"100"]))
        .expect("WAIT must succeed");
    assert_that!(parse_resp_integer(&replies[0]), eq(1_i64));
}

#[rstest]
fn follower_replays_the_leader_stream_and_answers_getack() {
    let app = Arc::new(follower_app());

    let set_frame = resp_command(&[b"SET", b"foo", b"bar"]);
    let getack_frame = resp_command(&[b"REPLCONF", b"GETACK", b"*"]);
    let ping_frame = resp_command(&[b"PING"]);

    let mut script = Vec::new();
    script.extend_from_slice(&WireValue::SimpleString("PONG".to_owned()).to_bytes());
    script.extend_from_slice(&WireValue::SimpleString("OK".to_owned()).to_bytes());
    script.extend_from_slice(&WireValue::SimpleString("OK".to_owned()).to_bytes());
    script.extend_from_slice(
        &WireValue::SimpleString(format!(
            "FULLRESYNC {} 0",
            "0123456789abcdefghijklmnopqrstuvwxyz0123"
        ))
        .to_bytes(),
    );
    script.extend_from_slice(&WireValue::RawBulk(empty_snapshot()).to_bytes());
    script.extend_from_slice(&set_frame);
    script.extend_from_slice(&getack_frame);
    script.extend_from_slice(&ping_frame);
    script.extend_from_slice(&getack_frame);

    let mut reader = FrameReader::new(Cursor::new(script));
    let mut sent = Vec::new();
    replay_leader_stream(&app, &mut reader, &mut sent, 6380)
        .expect("replay must end cleanly at EOF");

    // Replicated writes apply silently.
    let mut probe = client(&app);
    let observed = ingress_connection_bytes(&app, &mut probe, &resp_command(&[b"GET", b"foo"]))
        .expect("GET must succeed");
    assert_that!(&observed, eq(&vec![b"$3\r\nbar\r\n".to_vec()]));

    // The counter covers each byte up to and including the GETACK requests themselves.
    let first_offset = set_frame.len() + getack_frame.len();
    let second_offset = first_offset + ping_frame.len() + getack_frame.len();
    let first_text = first_offset.to_string();
    let second_text = second_offset.to_string();
    let first_ack = resp_command(&[b"REPLCONF", b"ACK", first_text.as_bytes()]);
    let second_ack = resp_command(&[b"REPLCONF", b"ACK", second_text.as_bytes()]);
    let mut expected = first_ack;
    expected.extend_from_slice(&second_ack);

    let handshake_len = sent.len() - expected.len();
    assert_that!(&sent[handshake_len..].to_vec(), eq(&expected));
}

#[rstest]
fn replicated_commands_produce_no_replies_through_the_discard_sink() {
    let app = follower_app();
    let mut session = client(&app);
    let mut sink = DiscardSink;

    let request = WireValue::command(&[b"SET", b"silent", b"yes"]);
    app.execute_frame(&mut session, &request, &mut sink)
        .expect("silent execution must succeed");

    let mut probe = client(&app);
    let observed = ingress_connection_bytes(&app, &mut probe, &resp_command(&[b"GET", b"silent"]))
        .expect("GET must succeed");
    assert_that!(&observed, eq(&vec![b"$3\r\nyes\r\n".to_vec()]));
}
