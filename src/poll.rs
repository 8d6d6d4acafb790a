//! Poll eligibility.
//!
//! Decides on every scheduler tick whether an active poll is warranted.

use std::time::Duration;

use crate::config::DEFAULT_POLL_INTERVAL;

/// Poll decision based on host state, poll age and reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl PollPolicy {
    /// Create a policy polling at most once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a poll should be attempted now.
    ///
    /// `since_last_poll` is `None` if the device has never been polled.
    pub fn needs_poll(
        &self,
        host_running: bool,
        since_last_poll: Option<Duration>,
        reachable: bool,
    ) -> bool {
        host_running
            && since_last_poll.map_or(true, |elapsed| elapsed >= self.interval)
            && reachable
    }
}
