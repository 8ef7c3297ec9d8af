//! Transaction control handlers.
//!
//! Queueing itself happens in the dispatch path: while a connection is in `MULTI` mode every
//! non-control command is appended to its queue and answered `+QUEUED`. These handlers cover
//! the control commands that open, run, and drop the queue.

use mfly_common::error::MflyResult;
use mfly_protocol::{CommandFrame, WireValue};

use super::sink::CollectingSink;
use super::{ConnectionSession, ReplySink, ServerApp};

pub(super) fn handle_multi(
    _app: &ServerApp,
    session: &mut ConnectionSession,
    _frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    session.tx.begin_multi();
    sink.send_value(&WireValue::SimpleString("OK".to_owned()))
}

pub(super) fn handle_exec(
    app: &ServerApp,
    session: &mut ConnectionSession,
    _frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    let Some(queued) = session.tx.take_queued_for_exec() else {
        return sink.send_value(&WireValue::Error("ERR EXEC without MULTI".to_owned()));
    };

    // Each queued request runs in submission order against an in-memory sink; error replies
    // become array entries and never abort the batch.
    let mut replies = CollectingSink::default();
    for frame in queued {
        app.execute_command(session, frame, &mut replies)?;
    }
    sink.send_value(&WireValue::Array(replies.into_replies()))
}

pub(super) fn handle_discard(
    _app: &ServerApp,
    session: &mut ConnectionSession,
    _frame: &CommandFrame,
    sink: &mut dyn ReplySink,
) -> MflyResult<()> {
    if session.tx.discard() {
        return sink.send_value(&WireValue::SimpleString("OK".to_owned()));
    }
    sink.send_value(&WireValue::Error("ERR DISCARD without MULTI".to_owned()))
}
