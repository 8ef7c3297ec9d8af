//! Connection and string command handlers.

use std::time::{Duration, SystemTime};

use mfly_common::error::MflyResult;
use mfly_protocol::{CommandFrame, WireValue};
use mfly_storage::KeyspaceError;

use super::{ConnectionSession, ReplySink, ServerApp};

/// Maps one keyspace failure to its wire error line.
///
/// `WRONGTYPE` carries its own prefix; everything else gets the standard `ERR` prefix.
pub(super) fn keyspace_error_reply(error: KeyspaceError) -> WireValue {
    match error {
        KeyspaceError::WrongType => WireValue::Error(error.to_string()),
        other => WireValue::Error(format!("ERR {other}")),
    }
}

pub(super) fn syntax_error_reply() -> WireValue {
    WireValue::Error("ERR syntax error".to_owned())
}

pub(super) fn not_integer_reply() -> WireValue {
    WireValue::Error("ERR value is not an integer or out of range".to_owned())
}

pub(super) fn parse_u64_arg(payload: &[u8]) -> Option<u64> {
    std::str::from_utf8(payload).ok()?.parse::<u64>().ok()
}

pub(super) fn handle_ping(
    _app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    if frame.args.len() > 1 {
        return sink.send_value(&WireValue::Error(
            "ERR wrong number of arguments for 'PING' command".to_owned(),
        ));
    }
    match frame.args.first() {
        Some(echo) => sink.send_value(&WireValue::bulk(echo.clone())),
        None => sink.send_value(&WireValue::bulk(b"PONG".as_slice())),
    }
}

pub(super) fn handle_echo(
    _app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    sink.send_value(&WireValue::bulk(frame.args[0].clone()))
}

pub(super) fn handle_set(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let key = &frame.args[0];
    let value = frame.args[1].clone();

    let mut expire_at: Option<SystemTime> = None;
    let mut index = 2_usize;
    while index < frame.args.len() {
        if frame.arg_matches(index, b"PX") {
            let Some(raw_expire) = frame.args.get(index + 1) else {
                return sink.send_value(&syntax_error_reply());
            };
            let Some(millis) = parse_u64_arg(raw_expire) else {
                return sink.send_value(&not_integer_reply());
            };
            expire_at = Some(SystemTime::now() + Duration::from_millis(millis));
            index += 2;
            continue;
        }
        return sink.send_value(&syntax_error_reply());
    }

    app.keyspace().set_string(key, value, expire_at);
    app.propagate_write(frame);
    sink.send_value(&WireValue::SimpleString("OK".to_owned()))
}

pub(super) fn handle_get(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    match app.keyspace().get_string(&frame.args[0]) {
        Ok(Some(value)) => sink.send_value(&WireValue::bulk(value)),
        Ok(None) => sink.send_value(&WireValue::NullBulk),
        Err(error) => sink.send_value(&keyspace_error_reply(error)),
    }
}

pub(super) fn handle_incr(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    match app.keyspace().increment(&frame.args[0]) {
        Ok(next) => {
            app.propagate_write(frame);
            sink.send_value(&WireValue::Integer(next))
        }
        Err(error) => sink.send_value(&keyspace_error_reply(error)),
    }
}

pub(super) fn handle_type(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let type_word = app.keyspace().type_of(&frame.args[0]);
    sink.send_value(&WireValue::SimpleString(type_word.to_owned()))
}

pub(super) fn handle_del(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let mut removed = 0_i64;
    for key in &frame.args {
        if app.keyspace().remove(key) {
            removed += 1;
        }
    }
    if removed > 0 {
        app.propagate_write(frame);
    }
    sink.send_value(&WireValue::Integer(removed))
}

pub(super) fn handle_keys(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    if frame.args[0] != b"*" {
        return sink.send_value(&WireValue::Error(
            "ERR only the '*' pattern is supported".to_owned(),
        ));
    }
    let keys = app
        .keyspace()
        .keys_all()
        .into_iter()
        .map(WireValue::BulkString)
        .collect::<Vec<_>>();
    sink.send_value(&WireValue::Array(keys))
}
