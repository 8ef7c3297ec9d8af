//! Cloneable progress watcher used by blocking primitives.
//!
//! `WAIT` blocks on replica acknowledgement progress and blocking `XREAD` blocks on stream
//! appends. Both follow the same shape: observe a token, sleep until somebody publishes
//! progress past that token or a deadline elapses, then re-check the real condition.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Shared progress counter with condition-variable wakeups.
///
/// Clones observe the same underlying counter. The counter value itself carries no meaning
/// beyond "something happened since the token was taken".
#[derive(Debug, Clone, Default)]
pub struct ProgressWatcher {
    shared: Arc<(Mutex<u64>, Condvar)>,
}

impl ProgressWatcher {
    /// Creates a fresh watcher with no recorded progress.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current progress token.
    #[must_use]
    pub fn token(&self) -> u64 {
        let (counter, _) = &*self.shared;
        *counter.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Records one unit of progress and wakes every waiter.
    pub fn publish_progress(&self) {
        let (counter, signal) = &*self.shared;
        {
            let mut guard = counter
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = guard.saturating_add(1);
        }
        signal.notify_all();
    }

    /// Blocks until progress moves past `token` or `timeout` elapses.
    ///
    /// Returns `true` when progress was observed, `false` on timeout.
    #[must_use]
    pub fn wait_for_progress_since(&self, token: u64, timeout: Duration) -> bool {
        // A timeout too large to represent as a deadline means "effectively forever".
        let Some(deadline) = std::time::Instant::now().checked_add(timeout) else {
            self.wait_for_progress_since_unbounded(token);
            return true;
        };
        let (counter, signal) = &*self.shared;
        let mut guard = counter
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while *guard == token {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (next_guard, wait_result) = signal
                .wait_timeout(guard, remaining)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard = next_guard;
            if wait_result.timed_out() && *guard == token {
                return false;
            }
        }
        true
    }

    /// Blocks until progress moves past `token`, with no deadline.
    pub fn wait_for_progress_since_unbounded(&self, token: u64) {
        let (counter, signal) = &*self.shared;
        let mut guard = counter
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while *guard == token {
            guard = signal
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}
