//! Command table and dispatch metadata.

use mfly_common::error::MflyResult;
use mfly_protocol::CommandFrame;
use mfly_storage::containers::HotMap;

use super::handlers_replication::{handle_psync, handle_replconf, handle_wait};
use super::handlers_server::{handle_config, handle_info};
use super::handlers_stream::{handle_xadd, handle_xrange, handle_xread};
use super::handlers_string::{
    handle_del, handle_echo, handle_get, handle_incr, handle_keys, handle_ping, handle_set,
    handle_type,
};
use super::handlers_transaction::{handle_discard, handle_exec, handle_multi};
use super::{ConnectionSession, ReplySink, ServerApp};

/// Handler function signature used by command table entries.
pub(crate) type CommandHandler =
    fn(&ServerApp, &mut ConnectionSession, &CommandFrame, &mut dyn ReplySink) -> MflyResult<()>;

/// Arity constraints for a command (argument count excludes the command word).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandArity {
    /// Command must have exactly this many arguments.
    Exact(usize),
    /// Command must have at least this many arguments.
    AtLeast(usize),
}

impl CommandArity {
    pub(crate) fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(expected) => count == expected,
            Self::AtLeast(minimum) => count >= minimum,
        }
    }
}

/// Metadata and callback for one command table entry.
#[derive(Debug, Clone)]
pub(crate) struct CommandSpec {
    /// Canonical uppercase command name.
    pub(crate) name: &'static str,
    /// Arity constraint used for lightweight input validation.
    pub(crate) arity: CommandArity,
    /// Handler callback.
    pub(crate) handler: CommandHandler,
}

/// Runtime command registry keyed by canonical uppercase name.
#[derive(Debug, Clone, Default)]
pub(crate) struct CommandRegistry {
    entries: HotMap<String, CommandSpec>,
}

impl CommandRegistry {
    /// Builds a registry preloaded with the full command surface.
    #[must_use]
    pub(crate) fn with_builtin_commands() -> Self {
        let mut registry = Self::default();
        registry.register_connection_commands();
        registry.register_string_commands();
        registry.register_stream_commands();
        registry.register_server_commands();
        registry.register_replication_commands();
        registry.register_transaction_commands();
        registry
    }

    fn register_connection_commands(&mut self) {
        self.register(CommandSpec {
            name: "PING",
            arity: CommandArity::AtLeast(0),
            handler: handle_ping,
        });
        self.register(CommandSpec {
            name: "ECHO",
            arity: CommandArity::Exact(1),
            handler: handle_echo,
        });
    }

    fn register_string_commands(&mut self) {
        self.register(CommandSpec {
            name: "SET",
            arity: CommandArity::AtLeast(2),
            handler: handle_set,
        });
        self.register(CommandSpec {
            name: "GET",
            arity: CommandArity::Exact(1),
            handler: handle_get,
        });
        self.register(CommandSpec {
            name: "INCR",
            arity: CommandArity::Exact(1),
            handler: handle_incr,
        });
        self.register(CommandSpec {
            name: "TYPE",
            arity: CommandArity::Exact(1),
            handler: handle_type,
        });
        self.register(CommandSpec {
            name: "DEL",
            arity: CommandArity::AtLeast(1),
            handler: handle_del,
        });
        self.register(CommandSpec {
            name: "KEYS",
            arity: CommandArity::Exact(1),
            handler: handle_keys,
        });
    }

    fn register_stream_commands(&mut self) {
        self.register(CommandSpec {
            name: "XADD",
            arity: CommandArity::AtLeast(4),
            handler: handle_xadd,
        });
        self.register(CommandSpec {
            name: "XRANGE",
            arity: CommandArity::Exact(3),
            handler: handle_xrange,
        });
        self.register(CommandSpec {
            name: "XREAD",
            arity: CommandArity::AtLeast(3),
            handler: handle_xread,
        });
    }

    fn register_server_commands(&mut self) {
        self.register(CommandSpec {
            name: "INFO",
            arity: CommandArity::AtLeast(0),
            handler: handle_info,
        });
        self.register(CommandSpec {
            name: "CONFIG",
            arity: CommandArity::AtLeast(2),
            handler: handle_config,
        });
    }

    fn register_replication_commands(&mut self) {
        self.register(CommandSpec {
            name: "REPLCONF",
            arity: CommandArity::AtLeast(1),
            handler: handle_replconf,
        });
        self.register(CommandSpec {
            name: "PSYNC",
            arity: CommandArity::Exact(2),
            handler: handle_psync,
        });
        self.register(CommandSpec {
            name: "WAIT",
            arity: CommandArity::Exact(2),
            handler: handle_wait,
        });
    }

    fn register_transaction_commands(&mut self) {
        self.register(CommandSpec {
            name: "MULTI",
            arity: CommandArity::Exact(0),
            handler: handle_multi,
        });
        self.register(CommandSpec {
            name: "EXEC",
            arity: CommandArity::Exact(0),
            handler: handle_exec,
        });
        self.register(CommandSpec {
            name: "DISCARD",
            arity: CommandArity::Exact(0),
            handler: handle_discard,
        });
    }

    /// Registers or replaces one command in the table.
    pub(crate) fn register(&mut self, spec: CommandSpec) {
        self.entries.insert(spec.name.to_owned(), spec);
    }

    /// Resolves one canonical uppercase name.
    pub(crate) fn lookup(&self, canonical: &str) -> Option<&CommandSpec> {
        self.entries.get(canonical)
    }
}
