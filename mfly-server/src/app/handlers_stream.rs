//! Stream command handlers.

use std::time::{Duration, Instant};

use mfly_common::error::MflyResult;
use mfly_protocol::{CommandFrame, WireValue};
use mfly_storage::KeyspaceError;
use mfly_stream::{FieldPair, RangeMatch};

use super::handlers_string::{
    keyspace_error_reply, not_integer_reply, parse_u64_arg, syntax_error_reply,
};
use super::{ConnectionSession, ReplySink, ServerApp};

fn malformed_id_reply() -> WireValue {
    WireValue::Error("ERR Invalid stream ID specified as stream command argument".to_owned())
}

pub(super) fn handle_xadd(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    if !(frame.args.len() - 2).is_multiple_of(2) {
        return sink.send_value(&WireValue::Error(
            "ERR wrong number of arguments for 'XADD' command".to_owned(),
        ));
    }
    let key = &frame.args[0];
    let Ok(id_text) = std::str::from_utf8(&frame.args[1]) else {
        return sink.send_value(&malformed_id_reply());
    };
    let fields = frame.args[2..]
        .chunks_exact(2)
        .map(|pair| FieldPair {
            field: pair[0].clone(),
            value: pair[1].clone(),
        })
        .collect::<Vec<_>>();

    match app
        .keyspace()
        .stream_append(key, id_text, fields, ServerApp::now_unix_millis())
    {
        Ok(accepted) => {
            app.propagate_write(frame);
            sink.send_value(&WireValue::bulk(accepted.into_bytes()))
        }
        Err(error) => sink.send_value(&keyspace_error_reply(error)),
    }
}

pub(super) fn handle_xrange(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let key = &frame.args[0];
    let (Ok(start), Ok(end)) = (
        std::str::from_utf8(&frame.args[1]),
        std::str::from_utf8(&frame.args[2]),
    ) else {
        return sink.send_value(&malformed_id_reply());
    };

    match app.keyspace().stream_range(key, start, end) {
        Ok(matches) => sink.send_value(&WireValue::Array(
            matches.iter().map(range_match_to_wire).collect(),
        )),
        Err(error) => sink.send_value(&keyspace_error_reply(error)),
    }
}

pub(super) fn handle_xread(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let mut index = 0_usize;
    let mut block_ms: Option<u64> = None;
    if frame.arg_matches(0, b"BLOCK") {
        let Some(raw_timeout) = frame.args.get(1) else {
            return sink.send_value(&syntax_error_reply());
        };
        let Some(timeout) = parse_u64_arg(raw_timeout) else {
            return sink.send_value(&not_integer_reply());
        };
        block_ms = Some(timeout);
        index = 2;
    }

    if !frame.arg_matches(index, b"STREAMS") {
        return sink.send_value(&syntax_error_reply());
    }
    let rest = &frame.args[index + 1..];
    if rest.is_empty() || !rest.len().is_multiple_of(2) {
        return sink.send_value(&syntax_error_reply());
    }

    let stream_count = rest.len() / 2;
    let mut targets = Vec::with_capacity(stream_count);
    for position in 0..stream_count {
        let key = rest[position].clone();
        let Ok(id_text) = std::str::from_utf8(&rest[stream_count + position]) else {
            return sink.send_value(&malformed_id_reply());
        };
        // `$` pins the lower bound to the stream's current top item at call time.
        let after = if id_text == "$" {
            match app.keyspace().stream_last_id(&key) {
                Ok(last_id) => last_id.to_string(),
                Err(error) => return sink.send_value(&keyspace_error_reply(error)),
            }
        } else {
            id_text.to_owned()
        };
        targets.push((key, after));
    }

    match scan_streams(app, &targets) {
        Err(error) => sink.send_value(&keyspace_error_reply(error)),
        Ok(results) if !results.is_empty() => sink.send_value(&xread_reply(&results)),
        Ok(_) => {
            let Some(timeout) = block_ms else {
                return sink.send_value(&WireValue::NullBulk);
            };
            block_on_streams(app, &targets, timeout, sink)
        }
    }
}

/// Waits for the first append matching any requested stream, up to `timeout_ms`.
///
/// A zero timeout waits indefinitely. The append signal is observed before each re-scan, so
/// an append landing between scan and sleep wakes the loop immediately.
fn block_on_streams(
    app: &ServerApp,
    targets: &[(Vec<u8>, String)],
    timeout_ms: u64,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let signal = app.keyspace().append_signal().clone();
    let deadline = (timeout_ms > 0)
        .then(|| Instant::now().checked_add(Duration::from_millis(timeout_ms)))
        .flatten();

    loop {
        let observed = signal.token();
        match scan_streams(app, targets) {
            Err(error) => return sink.send_value(&keyspace_error_reply(error)),
            Ok(results) if !results.is_empty() => {
                return sink.send_value(&xread_reply(&results));
            }
            Ok(_) => {}
        }

        match deadline {
            None => signal.wait_for_progress_since_unbounded(observed),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() || !signal.wait_for_progress_since(observed, remaining) {
                    return sink.send_value(&WireValue::NullBulk);
                }
            }
        }
    }
}

type StreamHits = Vec<(Vec<u8>, Vec<RangeMatch>)>;

fn scan_streams(app: &ServerApp, targets: &[(Vec<u8>, String)]) -> Result<StreamHits, KeyspaceError> {
    let mut results = Vec::new();
    for (key, after) in targets {
        let matches = app.keyspace().stream_read_after(key, after)?;
        if !matches.is_empty() {
            results.push((key.clone(), matches));
        }
    }
    Ok(results)
}

fn xread_reply(results: &StreamHits) -> WireValue {
    WireValue::Array(
        results
            .iter()
            .map(|(key, matches)| {
                WireValue::Array(vec![
                    WireValue::bulk(key.clone()),
                    WireValue::Array(matches.iter().map(range_match_to_wire).collect()),
                ])
            })
            .collect(),
    )
}

/// Encodes one entry as `[id, [field, value, ...]]`.
fn range_match_to_wire(entry: &RangeMatch) -> WireValue {
    let mut flat = Vec::with_capacity(entry.fields.len() * 2);
    for pair in &entry.fields {
        flat.push(WireValue::bulk(pair.field.clone()));
        flat.push(WireValue::bulk(pair.value.clone()));
    }
    WireValue::Array(vec![
        WireValue::bulk(entry.id.clone().into_bytes()),
        WireValue::Array(flat),
    ])
}
