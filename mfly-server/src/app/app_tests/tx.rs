use super::testkit::resp_command;
use super::{client, leader_app};
use crate::ingress::ingress_connection_bytes;
use googletest::prelude::*;
use rstest::rstest;

#[rstest]
fn multi_queues_commands_and_exec_replies_in_submission_order() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"MULTI"]),
            resp_command(&[b"SET", b"a", b"1"]),
            resp_command(&[b"INCR", b"a"]),
            resp_command(&[b"EXEC"]),
        ]
        .concat(),
    )
    .expect("transaction must succeed");

    assert_that!(
        &replies,
        eq(&vec![
            b"+OK\r\n".to_vec(),
            b"+QUEUED\r\n".to_vec(),
            b"+QUEUED\r\n".to_vec(),
            b"*2\r\n+OK\r\n:2\r\n".to_vec(),
        ])
    );
}

#[rstest]
fn queued_commands_do_not_touch_the_keyspace_before_exec() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"MULTI"]),
            resp_command(&[b"SET", b"pending", b"1"]),
        ]
        .concat(),
    )
    .expect("queueing must succeed");
    assert_that!(&replies[1], eq(&b"+QUEUED\r\n".to_vec()));

    let mut observer = client(&app);
    let observed = ingress_connection_bytes(&app, &mut observer, &resp_command(&[b"GET", b"pending"]))
        .expect("GET must succeed");
    assert_that!(&observed, eq(&vec![b"$-1\r\n".to_vec()]));
}

#[rstest]
fn exec_without_multi_is_an_error() {
    let app = leader_app();
    let mut connection = client(&app);

    let reply = ingress_connection_bytes(&app, &mut connection, &resp_command(&[b"EXEC"]))
        .expect("EXEC must parse");
    assert_that!(&reply, eq(&vec![b"-ERR EXEC without MULTI\r\n".to_vec()]));
}

#[rstest]
fn discard_drops_the_queue_and_errors_without_multi() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"MULTI"]),
            resp_command(&[b"SET", b"dropped", b"1"]),
            resp_command(&[b"DISCARD"]),
            resp_command(&[b"GET", b"dropped"]),
            resp_command(&[b"DISCARD"]),
        ]
        .concat(),
    )
    .expect("DISCARD flow must parse");

    assert_that!(&replies[2], eq(&b"+OK\r\n".to_vec()));
    assert_that!(&replies[3], eq(&b"$-1\r\n".to_vec()));
    assert_that!(
        &replies[4],
        eq(&b"-ERR DISCARD without MULTI\r\n".to_vec())
    );
}

#[rstest]
fn errors_inside_exec_do_not_abort_the_batch() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"SET", b"word", b"abc"]),
            resp_command(&[b"MULTI"]),
            resp_command(&[b"INCR", b"word"]),
            resp_command(&[b"SET", b"after", b"ok"]),
            resp_command(&[b"EXEC"]),
            resp_command(&[b"GET", b"after"]),
        ]
        .concat(),
    )
    .expect("transaction must parse");

    let exec_reply = String::from_utf8_lossy(&replies[4]).to_string();
    assert_that!(exec_reply.starts_with("*2\r\n"), eq(true));
    assert_that!(
        exec_reply.contains("-ERR value is not an integer or out of range\r\n"),
        eq(true)
    );
    assert_that!(exec_reply.contains("+OK\r\n"), eq(true));
    assert_that!(&replies[5], eq(&b"$3\r\nok\r\n".to_vec()));
}

#[rstest]
fn multi_reentry_resets_the_queue() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"MULTI"]),
            resp_command(&[b"SET", b"first", b"1"]),
            resp_command(&[b"MULTI"]),
            resp_command(&[b"SET", b"second", b"2"]),
            resp_command(&[b"EXEC"]),
        ]
        .concat(),
    )
    .expect("transaction must parse");

    // Only the post-reset command executed.
    assert_that!(&replies[4], eq(&b"*1\r\n+OK\r\n".to_vec()));

    let observed = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"GET", b"first"]),
            resp_command(&[b"GET", b"second"]),
        ]
        .concat(),
    )
    .expect("GET must succeed");
    assert_that!(&observed[0], eq(&b"$-1\r\n".to_vec()));
    assert_that!(&observed[1], eq(&b"$1\r\n2\r\n".to_vec()));
}

#[rstest]
fn transaction_state_is_scoped_to_one_connection() {
    let app = leader_app();
    let mut first = client(&app);
    let mut second = client(&app);

    let _ = ingress_connection_bytes(&app, &mut first, &resp_command(&[b"MULTI"]))
        .expect("MULTI must succeed");

    // The other connection is not in queue mode and executes immediately.
    let replies = ingress_connection_bytes(
        &app,
        &mut second,
        &resp_command(&[b"SET", b"visible", b"now"]),
    )
    .expect("SET must succeed");
    assert_that!(&replies, eq(&vec![b"+OK\r\n".to_vec()]));
}
