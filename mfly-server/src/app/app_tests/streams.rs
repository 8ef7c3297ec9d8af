use super::testkit::resp_command;
use super::{client, leader_app};
use crate::ingress::ingress_connection_bytes;
use googletest::prelude::*;
use rstest::rstest;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[rstest]
fn xadd_returns_the_canonical_id() {
    let app = leader_app();
    let mut connection = client(&app);

    let reply = ingress_connection_bytes(
        &app,
        &mut connection,
        &resp_command(&[b"XADD", b"s", b"5-0", b"f", b"v"]),
    )
    .expect("XADD must succeed");
    assert_that!(&reply, eq(&vec![b"$3\r\n5-0\r\n".to_vec()]));
}

#[rstest]
fn xadd_rejects_a_stale_id_with_the_top_item_error() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"XADD", b"s", b"5-0", b"f", b"v"]),
            resp_command(&[b"XADD", b"s", b"3-0", b"f", b"v"]),
        ]
        .concat(),
    )
    .expect("XADD must parse");
    assert_that!(
        &replies[1],
        eq(&b"-ERR The ID specified in XADD is equal or smaller than the target stream top item\r\n"
            .to_vec())
    );
}

#[rstest]
fn xadd_rejects_the_zero_id() {
    let app = leader_app();
    let mut connection = client(&app);

    let reply = ingress_connection_bytes(
        &app,
        &mut connection,
        &resp_command(&[b"XADD", b"s", b"0-0", b"f", b"v"]),
    )
    .expect("XADD must parse");
    assert_that!(
        &reply,
        eq(&vec![
            b"-ERR The ID specified in XADD must be greater than 0-0\r\n".to_vec()
        ])
    );
}

#[rstest]
fn xadd_auto_sequence_continues_within_the_millisecond() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"XADD", b"s", b"5-0", b"f", b"v"]),
            resp_command(&[b"XADD", b"s", b"5-*", b"f", b"v"]),
            resp_command(&[b"XADD", b"s", b"5-*", b"f", b"v"]),
        ]
        .concat(),
    )
    .expect("XADD must succeed");
    assert_that!(&replies[1], eq(&b"$3\r\n5-1\r\n".to_vec()));
    assert_that!(&replies[2], eq(&b"$3\r\n5-2\r\n".to_vec()));
}

#[rstest]
fn xadd_rejects_an_unbalanced_field_list() {
    let app = leader_app();
    let mut connection = client(&app);

    let reply = ingress_connection_bytes(
        &app,
        &mut connection,
        &resp_command(&[b"XADD", b"s", b"1-1", b"f", b"v", b"orphan"]),
    )
    .expect("XADD must parse");
    assert_that!(
        &reply,
        eq(&vec![
            b"-ERR wrong number of arguments for 'XADD' command\r\n".to_vec()
        ])
    );
}

#[rstest]
fn xrange_returns_id_and_payload_nested_arrays() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"XADD", b"s", b"1-1", b"a", b"1"]),
            resp_command(&[b"XADD", b"s", b"1-2", b"b", b"2"]),
            resp_command(&[b"XRANGE", b"s", b"-", b"+"]),
        ]
        .concat(),
    )
    .expect("XRANGE must succeed");
    let expected = b"*2\r\n\
*2\r\n$3\r\n1-1\r\n*2\r\n$1\r\na\r\n$1\r\n1\r\n\
*2\r\n$3\r\n1-2\r\n*2\r\n$1\r\nb\r\n$1\r\n2\r\n"
        .to_vec();
    assert_that!(&replies[2], eq(&expected));
}

#[rstest]
fn xrange_respects_inclusive_bounds() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"XADD", b"s", b"5-1", b"f", b"v"]),
            resp_command(&[b"XADD", b"s", b"5-2", b"f", b"v"]),
            resp_command(&[b"XADD", b"s", b"5-3", b"f", b"v"]),
            resp_command(&[b"XRANGE", b"s", b"5-2", b"5-3"]),
        ]
        .concat(),
    )
    .expect("XRANGE must succeed");
    let listing = String::from_utf8_lossy(&replies[3]).to_string();
    assert_that!(listing.starts_with("*2\r\n"), eq(true));
    assert_that!(listing.contains("5-2"), eq(true));
    assert_that!(listing.contains("5-3"), eq(true));
    assert_that!(listing.contains("5-1"), eq(false));
}

#[rstest]
fn xread_returns_entries_after_the_given_id() {
    let app = leader_app();
    let mut connection = client(&app);

    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"XADD", b"s", b"5-1", b"f", b"v"]),
            resp_command(&[b"XADD", b"s", b"5-2", b"g", b"w"]),
            resp_command(&[b"XREAD", b"STREAMS", b"s", b"5-1"]),
        ]
        .concat(),
    )
    .expect("XREAD must succeed");
    let expected = b"*1\r\n\
*2\r\n$1\r\ns\r\n\
*1\r\n*2\r\n$3\r\n5-2\r\n*2\r\n$1\r\ng\r\n$1\r\nw\r\n"
        .to_vec();
    assert_that!(&replies[2], eq(&expected));
}

#[rstest]
fn xread_without_matches_and_without_block_replies_null() {
    let app = leader_app();
    let mut connection = client(&app);

    let reply = ingress_connection_bytes(
        &app,
        &mut connection,
        &resp_command(&[b"XREAD", b"STREAMS", b"missing", b"0-0"]),
    )
    .expect("XREAD must parse");
    assert_that!(&reply, eq(&vec![b"$-1\r\n".to_vec()]));
}

#[rstest]
fn blocking_xread_times_out_with_null() {
    let app = leader_app();
    let mut connection = client(&app);

    let started_at = Instant::now();
    let reply = ingress_connection_bytes(
        &app,
        &mut connection,
        &resp_command(&[b"XREAD", b"BLOCK", b"60", b"STREAMS", b"s", b"$"]),
    )
    .expect("XREAD must parse");
    assert_that!(&reply, eq(&vec![b"$-1\r\n".to_vec()]));
    assert_that!(started_at.elapsed() >= Duration::from_millis(60), eq(true));
}

#[rstest]
fn blocking_xread_wakes_on_a_concurrent_append() {
    let app = Arc::new(leader_app());
    let mut connection = client(&app);

    let appender_app = Arc::clone(&app);
    let appender = std::thread::spawn(move || {
        let mut writer = super::client(&appender_app);
        std::thread::sleep(Duration::from_millis(40));
        let _ = ingress_connection_bytes(
            &appender_app,
            &mut writer,
            &resp_command(&[b"XADD", b"s", b"9-9", b"f", b"late"]),
        )
        .expect("XADD must succeed");
    });

    let reply = ingress_connection_bytes(
        &app,
        &mut connection,
        &resp_command(&[b"XREAD", b"BLOCK", b"0", b"STREAMS", b"s", b"0-0"]),
    )
    .expect("XREAD must succeed");
    appender.join().expect("appender thread must finish");

    let listing = String::from_utf8_lossy(&reply[0]).to_string();
    assert_that!(listing.contains("9-9"), eq(true));
    assert_that!(listing.contains("late"), eq(true));
}

#[rstest]
fn xread_rejects_a_missing_streams_keyword() {
    let app = leader_app();
    let mut connection = client(&app);

    let reply = ingress_connection_bytes(
        &app,
        &mut connection,
        &resp_command(&[b"XREAD", b"s", b"0-0", b"extra"]),
    )
    .expect("XREAD must parse");
    assert_that!(&reply, eq(&vec![b"-ERR syntax error\r\n".to_vec()]));
}
