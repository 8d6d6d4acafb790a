//! Acquisition configuration.
//!
//! Timeouts, retry budget and poll cadence for the acquisition path.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Default delay before the very first connection to an unpaired device.
pub const DEFAULT_PAIRING_WINDOW: Duration = Duration::from_secs(5);
/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default time to wait for a notification once subscribed.
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(8);
/// Default number of connection attempts per poll cycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default backoff after the first failed attempt; doubles per attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// How a single connection attempt establishes the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectStrategy {
    /// One raw connect per attempt.
    #[default]
    Direct,
    /// Retry the raw connect inside the attempt before reporting failure.
    Establish {
        /// Connect calls per attempt.
        attempts: u32,
        /// Pause between connect calls.
        delay: Duration,
    },
}

/// Configuration of an [`AcquisitionCoordinator`](crate::AcquisitionCoordinator).
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Minimum time between polls.
    pub poll_interval: Duration,
    /// One-time delay before the first connection to a never-paired
    /// device, `None` to connect immediately.
    pub pairing_window: Option<Duration>,
    /// Connect timeout per attempt.
    pub connect_timeout: Duration,
    /// Notification wait per attempt.
    pub notification_timeout: Duration,
    /// Connection attempts per cycle.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt.
    pub initial_backoff: Duration,
    /// Link establishment strategy.
    pub connect_strategy: ConnectStrategy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            pairing_window: Some(DEFAULT_PAIRING_WINDOW),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            connect_strategy: ConnectStrategy::Direct,
        }
    }
}

impl CoordinatorConfig {
    /// Fixed-interval polling with the pairing window (the default).
    pub fn new() -> Self {
        Self::default()
    }

    /// Polling driven by reachability alone, without a pairing window.
    pub fn active() -> Self {
        Self {
            pairing_window: None,
            ..Self::default()
        }
    }

    /// Set the poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set or disable the pairing window.
    #[must_use]
    pub fn pairing_window(mut self, window: Option<Duration>) -> Self {
        self.pairing_window = window;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the notification wait.
    #[must_use]
    pub fn notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Set the attempt budget and the first backoff.
    #[must_use]
    pub fn retry(mut self, max_attempts: u32, initial_backoff: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Set the link establishment strategy.
    #[must_use]
    pub fn connect_strategy(mut self, strategy: ConnectStrategy) -> Self {
        self.connect_strategy = strategy;
        self
    }

    /// Backoff to sleep after the failed attempt `attempt` (0-based):
    /// `initial_backoff * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Check the configuration for values the acquisition path cannot use.
    pub fn validate(&self) -> Result<()> {
        fn invalid(name: &str, value: impl std::fmt::Debug) -> Error {
            Error::InvalidParameter {
                name: name.to_string(),
                value: format!("{:?}", value),
            }
        }

        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", self.max_attempts));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval", self.poll_interval));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid("connect_timeout", self.connect_timeout));
        }
        if self.notification_timeout.is_zero() {
            return Err(invalid("notification_timeout", self.notification_timeout));
        }
        if let ConnectStrategy::Establish { attempts: 0, .. } = self.connect_strategy {
            return Err(invalid("connect_strategy.attempts", 0));
        }
        Ok(())
    }
}
