//! Per-connection state: identity, transaction queue, replica promotion.

use std::io::Write;

use mfly_protocol::CommandFrame;

/// Connection-scoped transaction queue.
///
/// `MULTI` opens (or re-opens) queue mode; queued raw frames are held until `EXEC` drains
/// them in order or `DISCARD`/connection close drops them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TransactionSession {
    in_multi: bool,
    queued_commands: Vec<CommandFrame>,
}

impl TransactionSession {
    /// Enters queue mode, resetting any previously queued commands.
    pub(crate) fn begin_multi(&mut self) {
        self.in_multi = true;
        self.queued_commands.clear();
    }

    /// Queues one command for later `EXEC`.
    pub(crate) fn queue_command(&mut self, frame: CommandFrame) {
        self.queued_commands.push(frame);
    }

    /// Discards queued commands and exits queue mode.
    ///
    /// Returns `false` when no transaction is active.
    #[must_use]
    pub(crate) fn discard(&mut self) -> bool {
        if !self.in_multi {
            return false;
        }
        self.in_multi = false;
        self.queued_commands.clear();
        true
    }

    /// Exits queue mode and returns queued commands for execution.
    ///
    /// Returns `None` when no transaction is active.
    pub(crate) fn take_queued_for_exec(&mut self) -> Option<Vec<CommandFrame>> {
        if !self.in_multi {
            return None;
        }
        self.in_multi = false;
        Some(std::mem::take(&mut self.queued_commands))
    }

    /// Whether this connection is currently in queue mode.
    #[must_use]
    pub(crate) fn in_multi(&self) -> bool {
        self.in_multi
    }
}

/// Mutable state attached to one client connection.
///
/// Sessions are keyed by a process-monotonic id, never by remote address, so address reuse
/// can never leak transaction state between clients.
pub(crate) struct ConnectionSession {
    /// Monotonic connection identity.
    pub(crate) id: u64,
    /// Transaction queue state.
    pub(crate) tx: TransactionSession,
    /// Replica link id once `PSYNC` promoted this connection.
    pub(crate) replica_link: Option<u64>,
    replica_writer: Option<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("tx", &self.tx)
            .field("replica_link", &self.replica_link)
            .field("has_replica_writer", &self.replica_writer.is_some())
            .finish()
    }
}

impl ConnectionSession {
    pub(crate) fn new(id: u64, replica_writer: Option<Box<dyn Write + Send>>) -> Self {
        Self {
            id,
            tx: TransactionSession::default(),
            replica_link: None,
            replica_writer,
        }
    }

    /// Surrenders the connection's write half for replica-lane registration.
    pub(crate) fn take_replica_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.replica_writer.take()
    }
}
