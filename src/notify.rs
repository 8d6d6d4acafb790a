//! Notification waiter.
//!
//! Bridges a pushed notification into a bounded wait. The waiter is level
//! triggered: once signaled it stays signaled until [`reset`](NotificationWaiter::reset).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// One-shot, resettable signal with a timed wait.
#[derive(Debug, Clone)]
pub struct NotificationWaiter {
    signaled: Arc<watch::Sender<bool>>,
}

impl Default for NotificationWaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationWaiter {
    /// Create a waiter in the "not yet signaled" state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            signaled: Arc::new(tx),
        }
    }

    /// Return to the "not yet signaled" state.
    pub fn reset(&self) {
        self.signaled.send_replace(false);
    }

    /// Signal, waking every current waiter.
    pub fn signal(&self) {
        self.signaled.send_replace(true);
    }

    /// Check the current state without waiting.
    pub fn is_signaled(&self) -> bool {
        *self.signaled.borrow()
    }

    /// Wait until signaled or until `timeout` elapses.
    ///
    /// Returns `true` if signaled, `false` on timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.signaled.subscribe();
        let signaled = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|signaled| *signaled)).await,
            Ok(Ok(_))
        );
        signaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let waiter = NotificationWaiter::new();
        let start = tokio::time::Instant::now();

        assert!(!waiter.wait(Duration::from_secs(8)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_signal_before_wait() {
        let waiter = NotificationWaiter::new();
        waiter.signal();
        assert!(waiter.is_signaled());
        assert!(waiter.wait(Duration::from_millis(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_during_wait() {
        let waiter = NotificationWaiter::new();
        let signaler = waiter.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            signaler.signal();
        });

        let start = tokio::time::Instant::now();
        assert!(waiter.wait(Duration::from_secs(8)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_reset_clears_signal() {
        let waiter = NotificationWaiter::new();
        waiter.signal();
        waiter.reset();
        assert!(!waiter.is_signaled());
        assert!(!waiter.wait(Duration::from_millis(10)).await);
    }
}
