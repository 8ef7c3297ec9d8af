//! Process composition root for `mfly-server`.

mod dispatch;
mod handlers_replication;
mod handlers_server;
mod handlers_stream;
mod handlers_string;
mod handlers_transaction;
mod session;
mod sink;


use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use mfly_common::config::ServerConfig;
use mfly_common::error::{MflyError, MflyResult};
use mfly_protocol::{CommandFrame, WireValue};
use mfly_replication::LeaderState;
use mfly_storage::keyspace::ValueEntry;
use mfly_storage::{Keyspace, SnapshotSink, read_snapshot};

use dispatch::CommandRegistry;
pub(crate) use session::ConnectionSession;
pub(crate) use sink::{DiscardSink, ReplySink, WriterSink};

/// Replication role fixed at startup from `--replicaof`.
#[derive(Debug)]
pub(crate) enum ServerRole {
    /// This node accepts writes and propagates them to registered replicas.
    Leader(Mutex<LeaderState>),
    /// This node replays the leader's command stream.
    Follower,
}

/// Shared server state handed to every connection thread.
#[derive(Debug)]
pub(crate) struct ServerApp {
    /// Immutable process configuration.
    pub(crate) config: ServerConfig,
    keyspace: Keyspace,
    role: ServerRole,
    registry: CommandRegistry,
    next_connection_id: AtomicU64,
}

impl ServerApp {
    /// Creates the composition from process configuration.
    pub(crate) fn new(config: ServerConfig) -> Self {
        let role = if config.is_follower() {
            ServerRole::Follower
        } else {
            ServerRole::Leader(Mutex::new(LeaderState::new()))
        };
        Self {
            config,
            keyspace: Keyspace::new(),
            role,
            registry: CommandRegistry::with_builtin_commands(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub(crate) fn role(&self) -> &ServerRole {
        &self.role
    }

    pub(crate) fn leader_guard(&self) -> Option<MutexGuard<'_, LeaderState>> {
        let ServerRole::Leader(leader) = &self.role else {
            return None;
        };
        Some(leader.lock().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Allocates one connection session with a monotonic identity.
    pub(crate) fn new_session(
        &self,
        replica_writer: Option<Box<dyn std::io::Write + Send>>,
    ) -> ConnectionSession {
        let id = self.next_connection_id.fetch_add(1, Ordering::AcqRel);
        ConnectionSession::new(id, replica_writer)
    }

    /// Executes one decoded request frame against shared state.
    ///
    /// # Errors
    ///
    /// Returns protocol errors for malformed request shapes and transport errors from the
    /// reply sink; semantic failures are replied as error frames instead.
    pub(crate) fn execute_frame(
        &self,
        session: &mut ConnectionSession,
        value: &WireValue,
        sink: &mut dyn ReplySink,
    ) -> MflyResult<()> {
        let frame = CommandFrame::from_value(value)?;
        self.execute_command(session, frame, sink)
    }

    /// Dispatches one command frame, applying transaction queueing first.
    pub(crate) fn execute_command(
        &self,
        session: &mut ConnectionSession,
        frame: CommandFrame,
        sink: &mut dyn ReplySink,
    ) -> MflyResult<()> {
        let canonical = frame.canonical_name();
        if session.tx.in_multi() && !is_transaction_control(&canonical) {
            session.tx.queue_command(frame);
            return sink.send_value(&WireValue::SimpleString("QUEUED".to_owned()));
        }

        let Some(spec) = self.registry.lookup(&canonical) else {
            let name = frame.name.to_ascii_lowercase();
            return sink.send_value(&WireValue::Error(format!("ERR unknown command '{name}'")));
        };
        if !spec.arity.accepts(frame.args.len()) {
            return sink.send_value(&WireValue::Error(format!(
                "ERR wrong number of arguments for '{}' command",
                spec.name
            )));
        }
        (spec.handler)(self, session, &frame, sink)
    }

    /// Hands one successfully applied write to the replica fan-out.
    ///
    /// No-op on followers; replayed leader traffic therefore never re-propagates.
    pub(crate) fn propagate_write(&self, frame: &CommandFrame) {
        if let Some(mut leader) = self.leader_guard() {
            leader.propagate(&frame.raw);
        }
    }

    /// Hydrates the keyspace from the configured snapshot file.
    ///
    /// Any failure is logged and the server continues with whatever was loaded so far.
    pub(crate) fn hydrate_from_snapshot_file(&self) {
        let Some(path) = self.config.snapshot_path() else {
            return;
        };
        let payload = match std::fs::read(&path) {
            Ok(payload) => payload,
            Err(error) => {
                eprintln!("skipping snapshot {}: {error}", path.display());
                return;
            }
        };
        match self.apply_snapshot_payload(&payload) {
            Ok(loaded) => println!("hydrated {loaded} keys from {}", path.display()),
            Err(error) => eprintln!("failed to read snapshot {}: {error}", path.display()),
        }
    }

    /// Installs every entry of one snapshot payload into the keyspace.
    ///
    /// # Errors
    ///
    /// Returns the snapshot codec error when the payload is malformed.
    pub(crate) fn apply_snapshot_payload(&self, payload: &[u8]) -> MflyResult<usize> {
        let mut sink = HydrationSink {
            keyspace: &self.keyspace,
            loaded: 0,
        };
        read_snapshot(payload, &mut sink)?;
        Ok(sink.loaded)
    }

    /// Releases connection-owned resources when a socket closes.
    pub(crate) fn disconnect(&self, session: &mut ConnectionSession) {
        if let Some(link_id) = session.replica_link.take()
            && let Some(mut leader) = self.leader_guard()
        {
            leader.remove_replica(link_id);
        }
    }

    /// Wall-clock milliseconds since the Unix epoch, used for stream auto-IDs.
    pub(crate) fn now_unix_millis() -> u64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }
}

fn is_transaction_control(canonical: &str) -> bool {
    matches!(canonical, "MULTI" | "EXEC" | "DISCARD")
}

struct HydrationSink<'a> {
    keyspace: &'a Keyspace,
    loaded: usize,
}

impl SnapshotSink for HydrationSink<'_> {
    fn aux_field(&mut self, _key: Vec<u8>, _value: Vec<u8>) {}

    fn db_entry(&mut self, key: Vec<u8>, value: Vec<u8>, expire_at: Option<SystemTime>) {
        // Already-stale entries are installed too; lazy expiry elides them on first access.
        self.keyspace
            .install_entry(key, ValueEntry::new_string(value, expire_at));
        self.loaded += 1;
    }
}

/// Parses flags, hydrates state, starts the leader link when configured, and serves.
///
/// # Errors
///
/// Returns `MflyError::Io` when the listen port cannot be bound.
pub(crate) fn run() -> MflyResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ServerConfig::from_args(&args);
    let app = Arc::new(ServerApp::new(config));

    app.hydrate_from_snapshot_file();

    if let Some(leader) = app.config.replica_of.clone() {
        let link_app = Arc::clone(&app);
        let listening_port = app.config.port;
        std::thread::Builder::new()
            .name("mfly-leader-link".to_owned())
            .spawn(move || {
                crate::follower_link::run_follower_link(&link_app, &leader, listening_port);
            })
            .map_err(|error| MflyError::Io(error.to_string()))?;
    }

    crate::network::run_listener(&app)
}
