//! Server introspection command handlers.

use mfly_common::error::MflyResult;
use mfly_protocol::{CommandFrame, WireValue};

use super::{ConnectionSession, ReplySink, ServerApp, ServerRole};

pub(super) fn handle_info(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    _frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    use std::fmt::Write as _;

    let mut body = String::from("# Replication\r\n");
    match app.role() {
        ServerRole::Leader(_) => {
            let Some(leader) = app.leader_guard() else {
                unreachable!("leader role must carry leader state");
            };
            write!(
                body,
                "role:master\r\nmaster_replid:{}\r\nmaster_repl_offset:{}\r\n",
                leader.replication_id(),
                leader.offset()
            )
            .expect("writing to String should not fail");
        }
        ServerRole::Follower => body.push_str("role:slave\r\n"),
    }
    sink.send_value(&WireValue::bulk(body.into_bytes()))
}

pub(super) fn handle_config(
    app: &ServerApp,
    _session: &mut ConnectionSession,
    frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    if !frame.arg_matches(0, b"GET") {
        let subcommand = String::from_utf8_lossy(&frame.args[0]).to_ascii_uppercase();
        return sink.send_value(&WireValue::Error(format!(
            "ERR unknown CONFIG subcommand '{subcommand}'"
        )));
    }

    let mut pairs = Vec::new();
    for parameter in &frame.args[1..] {
        let Ok(name) = std::str::from_utf8(parameter) else {
            continue;
        };
        if let Some(value) = app.config.raw_flag(name) {
            pairs.push(WireValue::bulk(parameter.clone()));
            pairs.push(WireValue::bulk(value.as_bytes()));
        }
    }
    sink.send_value(&WireValue::Array(pairs))
}
