//! No-client shutdown timer.
//!
//! The timer starts when the last SSE subscriber disconnects, or at boot
//! if none ever connect; any SSE connect cancels it; any non-`/api/shutdown`
//! API call resets it when there are no subscribers. Modelled as a small
//! atomic deadline rather than a dedicated thread so the broadcast-tick
//! loop (already polling every second for `countdown`/`heartbeat`) can
//! check it for free — the same "fold background work into the existing
//! tick" shape `sparkle_git::scheduler::CommitScheduler` uses for its own
//! debounce deadline.

use sparkle_core::config::NoClientTimeoutMode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tracks whether (and when) the daemon should exit due to client idleness.
pub struct NoClientTimeout {
    mode: NoClientTimeoutMode,
    epoch: Instant,
    deadline_millis: AtomicU64,
    armed: AtomicBool,
}

const NO_DEADLINE: u64 = u64::MAX;

impl NoClientTimeout {
    #[must_use]
    pub fn new(mode: NoClientTimeoutMode) -> Self {
        let timeout = Self {
            mode,
            epoch: Instant::now(),
            deadline_millis: AtomicU64::new(NO_DEADLINE),
            armed: AtomicBool::new(false),
        };
        timeout.arm_if_applicable();
        timeout
    }

    fn arm_if_applicable(&self) {
        match self.mode.idle_seconds() {
            Some(secs) => {
                let deadline = self.epoch.elapsed() + Duration::from_secs(secs);
                self.deadline_millis
                    .store(u64::try_from(deadline.as_millis()).unwrap_or(NO_DEADLINE), Ordering::SeqCst);
                self.armed.store(true, Ordering::SeqCst);
            }
            None => {
                self.deadline_millis.store(NO_DEADLINE, Ordering::SeqCst);
                self.armed.store(false, Ordering::SeqCst);
            }
        }
    }

    /// An SSE client connected: cancel the pending shutdown.
    pub fn cancel(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.deadline_millis.store(NO_DEADLINE, Ordering::SeqCst);
    }

    /// The last SSE subscriber disconnected, or an API call with no
    /// subscribers present just completed: (re)start the idle clock.
    pub fn restart(&self) {
        self.arm_if_applicable();
    }

    /// Called from the broadcast tick; `true` once the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        if !self.armed.load(Ordering::SeqCst) {
            return false;
        }
        let deadline = self.deadline_millis.load(Ordering::SeqCst);
        if deadline == NO_DEADLINE {
            return false;
        }
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX) >= deadline
    }

    /// Remaining time until shutdown, for the `countdown` SSE event
    ///. `None` when no timer is armed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        if !self.armed.load(Ordering::SeqCst) {
            return None;
        }
        let deadline = self.deadline_millis.load(Ordering::SeqCst);
        if deadline == NO_DEADLINE {
            return None;
        }
        let elapsed = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        Some(Duration::from_millis(deadline.saturating_sub(elapsed)))
    }
}

/// Format a remaining duration as a `"m:ss"` countdown string.
#[must_use]
pub fn format_countdown(remaining: Duration) -> String {
    let total_secs = remaining.as_secs();
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}
