use super::testkit::resp_command;
use super::{client, leader_app};
use crate::ingress::ingress_connection_bytes;
use googletest::prelude::*;
use mfly_storage::crc64;
use rstest::rstest;

fn snapshot_with_entries(entries: &[(&[u8], &[u8], Option<u64>)]) -> Vec<u8> {
    let mut payload = b"REDIS0011".to_vec();
    payload.push(0xFE);
    payload.push(0);
    payload.push(0xFB);
    payload.push(u8::try_from(entries.len()).expect("test entry count must fit a length byte"));
    let with_expiry = entries.iter().filter(|entry| entry.2.is_some()).count();
    payload.push(u8::try_from(with_expiry).expect("test expiry count must fit a length byte"));
    for (key, value, expire_ms) in entries {
        if let Some(millis) = expire_ms {
            payload.push(0xFC);
            payload.extend_from_slice(&millis.to_le_bytes());
        }
        payload.push(0x00);
        payload.push(u8::try_from(key.len()).expect("test key must be short"));
        payload.extend_from_slice(key);
        payload.push(u8::try_from(value.len()).expect("test value must be short"));
        payload.extend_from_slice(value);
    }
    payload.push(0xFF);
    let trailer = crc64::checksum(&payload);
    payload.extend_from_slice(&trailer.to_be_bytes());
    payload
}

#[rstest]
fn hydrated_entries_are_served_to_clients() {
    let app = leader_app();
    let loaded = app
        .apply_snapshot_payload(&snapshot_with_entries(&[
            (b"city", b"porto", None),
            (b"lang", b"rust", None),
        ]))
        .expect("hydration must succeed");
    assert_that!(loaded, eq(2_usize));

    let mut connection = client(&app);
    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"GET", b"city"]),
            resp_command(&[b"KEYS", b"*"]),
        ]
        .concat(),
    )
    .expect("reads must succeed");
    assert_that!(&replies[0], eq(&b"$5\r\nporto\r\n".to_vec()));
    let listing = String::from_utf8_lossy(&replies[1]).to_string();
    assert_that!(listing.starts_with("*2\r\n"), eq(true));
    assert_that!(listing.contains("lang"), eq(true));
}

#[rstest]
fn hydrated_entries_with_past_expiry_are_observably_absent() {
    let app = leader_app();
    let loaded = app
        .apply_snapshot_payload(&snapshot_with_entries(&[
            (b"stale", b"gone", Some(1)),
            (b"fresh", b"kept", None),
        ]))
        .expect("hydration must succeed");
    // The codec reports stale entries too; visibility is decided at read time.
    assert_that!(loaded, eq(2_usize));

    let mut connection = client(&app);
    let replies = ingress_connection_bytes(
        &app,
        &mut connection,
        &[
            resp_command(&[b"GET", b"stale"]),
            resp_command(&[b"GET", b"fresh"]),
        ]
        .concat(),
    )
    .expect("reads must succeed");
    assert_that!(&replies[0], eq(&b"$-1\r\n".to_vec()));
    assert_that!(&replies[1], eq(&b"$4\r\nkept\r\n".to_vec()));
}

#[rstest]
fn malformed_snapshot_payloads_are_rejected() {
    let app = leader_app();
    let error = app
        .apply_snapshot_payload(b"NOTRDB")
        .expect_err("garbage must be rejected");
    assert_that!(
        matches!(error, mfly_common::error::MflyError::Protocol(_)),
        eq(true)
    );
}
