//! Leader-side replication state.

use std::io::Write;
use std::sync::{Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mfly_common::progress::ProgressWatcher;
use rand::Rng;

/// Redis-compatible replication id length.
const REPLICATION_ID_LEN: usize = 40;
const REPLICATION_ID_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Bound on buffered outbound frames per replica; overflow detaches the link.
const LANE_BUFFER_FRAMES: usize = 256;

#[derive(Debug)]
enum LaneCommand {
    Frame(Vec<u8>),
    Flush(mpsc::Sender<()>),
}

/// One registered replica connection with its dedicated writer lane.
struct ReplicaLink {
    id: u64,
    acked_offset: u64,
    sender: mpsc::SyncSender<LaneCommand>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ReplicaLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaLink")
            .field("id", &self.id)
            .field("acked_offset", &self.acked_offset)
            .field("has_worker", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

/// Mutable replication state for one leader instance.
#[derive(Debug)]
pub struct LeaderState {
    replication_id: String,
    offset: u64,
    links: Vec<ReplicaLink>,
    next_link_id: u64,
    ack_progress: ProgressWatcher,
}

impl Default for LeaderState {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderState {
    /// Creates leader state with a fresh random replication id and zero offset.
    #[must_use]
    pub fn new() -> Self {
        Self {
            replication_id: generate_replication_id(),
            offset: 0,
            links: Vec::new(),
            next_link_id: 1,
            ack_progress: ProgressWatcher::new(),
        }
    }

    /// 40-char lowercase alphanumeric replication id.
    #[must_use]
    pub fn replication_id(&self) -> &str {
        &self.replication_id
    }

    /// Total bytes of propagated traffic since startup.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of currently attached replica links.
    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.links.len()
    }

    /// Watcher published whenever a replica acknowledgement arrives.
    #[must_use]
    pub fn ack_progress_watcher(&self) -> ProgressWatcher {
        self.ack_progress.clone()
    }

    /// Registers one replica connection and spawns its writer lane.
    ///
    /// Returns the link id used to attribute later `REPLCONF ACK` frames.
    pub fn register_replica(&mut self, writer: Box<dyn Write + Send>) -> u64 {
        let id = self.next_link_id;
        self.next_link_id = self.next_link_id.saturating_add(1);

        let (sender, receiver) = mpsc::sync_channel::<LaneCommand>(LANE_BUFFER_FRAMES);
        let worker = thread::Builder::new()
            .name(format!("mfly-replica-lane-{id}"))
            .spawn(move || replica_lane_main(&receiver, writer))
            .ok();

        self.links.push(ReplicaLink {
            id,
            acked_offset: 0,
            sender,
            worker,
        });
        id
    }

    /// Fans one serialized frame out to every live replica link.
    ///
    /// The propagation offset advances by the frame length. Links whose lane is gone or whose
    /// buffer is full are detached; transmission failures never surface to the caller.
    pub fn propagate(&mut self, frame: &[u8]) {
        self.offset = self.offset.saturating_add(frame.len() as u64);
        self.links
            .retain(|link| link.sender.try_send(LaneCommand::Frame(frame.to_vec())).is_ok());
    }

    /// Records one replica acknowledgement offset, applied monotonically per link.
    pub fn record_ack(&mut self, link_id: u64, offset: u64) {
        if let Some(link) = self.links.iter_mut().find(|link| link.id == link_id)
            && offset > link.acked_offset
        {
            link.acked_offset = offset;
        }
        self.ack_progress.publish_progress();
    }

    /// Detaches one replica link (its lane exits once the queue drains).
    pub fn remove_replica(&mut self, link_id: u64) {
        self.links.retain(|link| link.id != link_id);
    }

    /// Counts replicas whose acknowledged offset reached `offset`.
    #[must_use]
    pub fn acked_replica_count_at_or_above(&self, offset: u64) -> usize {
        self.links
            .iter()
            .filter(|link| link.acked_offset >= offset)
            .count()
    }

    /// Blocks until every lane has written its queued frames.
    pub fn flush_links(&self) {
        for link in &self.links {
            let (ack_sender, ack_receiver) = mpsc::channel::<()>();
            if link.sender.send(LaneCommand::Flush(ack_sender)).is_ok() {
                let _ = ack_receiver.recv_timeout(Duration::from_secs(1));
            }
        }
    }
}

impl Drop for LeaderState {
    fn drop(&mut self) {
        for link in self.links.drain(..) {
            let ReplicaLink { sender, worker, .. } = link;
            drop(sender);
            if let Some(worker) = worker {
                let _ = worker.join();
            }
        }
    }
}

fn replica_lane_main(receiver: &mpsc::Receiver<LaneCommand>, mut writer: Box<dyn Write + Send>) {
    loop {
        let Ok(command) = receiver.recv() else {
            return;
        };
        match command {
            LaneCommand::Frame(frame) => {
                if writer.write_all(&frame).is_err() {
                    return;
                }
            }
            LaneCommand::Flush(waiter) => {
                let _ = writer.flush();
                let _ = waiter.send(());
            }
        }
    }
}

/// Blocks until `required` replicas acknowledge the propagation offset observed at entry.
///
/// Solicits acknowledgements by propagating `getack_frame` through the ordinary lanes (so it
/// stays in FIFO order with preceding writes), then sleeps on ACK progress, re-counting after
/// every wakeup. `timeout_ms == 0` waits indefinitely. Returns the count reached, which the
/// deadline may leave below `required`.
#[must_use]
pub fn wait_for_acked_replicas(
    leader: &Mutex<LeaderState>,
    required: u64,
    timeout_ms: u64,
    getack_frame: &[u8],
) -> u64 {
    let (target_offset, ack_watcher) = {
        let mut guard = lock_leader(leader);
        let target_offset = guard.offset();
        let satisfied = count_at(&guard, target_offset);
        if satisfied >= required {
            return satisfied;
        }
        if guard.replica_count() > 0 {
            guard.propagate(getack_frame);
        }
        (target_offset, guard.ack_progress_watcher())
    };

    let deadline = (timeout_ms > 0)
        .then(|| Instant::now().checked_add(Duration::from_millis(timeout_ms)))
        .flatten();
    loop {
        let observed_progress = ack_watcher.token();
        let replicated = count_at(&lock_leader(leader), target_offset);
        if replicated >= required {
            return replicated;
        }

        match deadline {
            None => ack_watcher.wait_for_progress_since_unbounded(observed_progress),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero()
                    || !ack_watcher.wait_for_progress_since(observed_progress, remaining)
                {
                    return count_at(&lock_leader(leader), target_offset);
                }
            }
        }
    }
}

fn lock_leader(leader: &Mutex<LeaderState>) -> std::sync::MutexGuard<'_, LeaderState> {
    leader
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn count_at(leader: &LeaderState, offset: u64) -> u64 {
    u64::try_from(leader.acked_replica_count_at_or_above(offset)).unwrap_or(u64::MAX)
}

fn generate_replication_id() -> String {
    let mut rng = rand::rng();
    (0..REPLICATION_ID_LEN)
        .map(|_| {
            let index = rng.random_range(0..REPLICATION_ID_CHARSET.len());
            char::from(REPLICATION_ID_CHARSET[index])
        })
        .collect()
}
