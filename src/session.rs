//! Connection session management.
//!
//! One poll cycle runs up to `max_attempts` connection attempts. Each attempt
//! connects, optionally pairs, subscribes to the status characteristic,
//! waits for a notification, unsubscribes and disconnects. The link is
//! released on every exit path, including cancellation of the cycle.
//! Every transport call runs under the connect timeout.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ble::connection::ConnectionState;
use crate::ble::transport::{NotificationCallback, PairOutcome, Transport};
use crate::config::{ConnectStrategy, CoordinatorConfig};
use crate::error::{Error, Result};
use crate::notify::NotificationWaiter;

/// What a successful exchange looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Attempt (1-based) that succeeded.
    pub attempts: u32,
    /// Whether a notification arrived before the wait timed out.
    pub notification_received: bool,
}

/// Owns a connected session and releases it on drop if it was not
/// released explicitly. A live subscription is dropped before the link.
struct SessionGuard<T: Transport> {
    transport: Arc<T>,
    session: Option<T::Session>,
    subscribed: Option<Uuid>,
    state: Arc<RwLock<ConnectionState>>,
}

impl<T: Transport> SessionGuard<T> {
    fn new(transport: Arc<T>, session: T::Session, state: Arc<RwLock<ConnectionState>>) -> Self {
        Self {
            transport,
            session: Some(session),
            subscribed: None,
            state,
        }
    }

    fn session(&self) -> Result<&T::Session> {
        self.session.as_ref().ok_or(Error::NotConnected)
    }

    async fn release(mut self, timeout: Duration) -> Result<()> {
        let result = match self.session.take() {
            Some(session) => bounded(timeout, self.transport.disconnect(&session)).await,
            None => Ok(()),
        };
        *self.state.write() = ConnectionState::Disconnected;
        result
    }
}

impl<T: Transport> Drop for SessionGuard<T> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        *self.state.write() = ConnectionState::Disconnected;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!("Session dropped mid-exchange, releasing in background");
                let transport = self.transport.clone();
                let subscribed = self.subscribed.take();
                runtime.spawn(async move {
                    if let Some(characteristic) = subscribed {
                        if let Err(e) = transport.unsubscribe(&session, characteristic).await {
                            warn!("Background unsubscribe failed: {}", e);
                        }
                    }
                    if let Err(e) = transport.disconnect(&session).await {
                        warn!("Background disconnect failed: {}", e);
                    }
                });
            }
            Err(_) => error!("Session dropped outside a runtime, link not released"),
        }
    }
}

/// Run one transport call with a deadline. An elapsed deadline is a
/// transport error so the attempt is retried.
async fn bounded<R>(timeout: Duration, call: impl Future<Output = Result<R>>) -> Result<R> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::ConnectTimeout { timeout }),
    }
}

/// Runs the retrying connect/notify/disconnect exchange.
pub struct SessionManager<T: Transport> {
    transport: Arc<T>,
    config: CoordinatorConfig,
    characteristic: Uuid,
    state: Arc<RwLock<ConnectionState>>,
}

impl<T: Transport> SessionManager<T> {
    /// Create a session manager for `characteristic`.
    pub fn new(transport: Arc<T>, config: CoordinatorConfig, characteristic: Uuid) -> Self {
        Self {
            transport,
            config,
            characteristic,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);
        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
        }
    }

    /// Perform one full exchange with bounded retries.
    ///
    /// Transport errors are retried with exponential backoff; after the last
    /// attempt they surface as [`Error::AttemptsExhausted`]. Any other error
    /// aborts immediately as [`Error::Unexpected`]. A notification timeout is
    /// not an error.
    pub async fn exchange(
        &self,
        handle: &T::Handle,
        address: &str,
        request_pairing: bool,
        on_notify: NotificationCallback,
        waiter: &NotificationWaiter,
    ) -> Result<ExchangeOutcome> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            debug!(
                "Connection attempt {}/{} for device at {}{}",
                attempt + 1,
                max_attempts,
                address,
                if request_pairing { " (with pairing)" } else { "" }
            );

            let result = self
                .attempt(handle, request_pairing, on_notify.clone(), waiter)
                .await;
            self.set_state(ConnectionState::Disconnected);

            match result {
                Ok(notification_received) => {
                    return Ok(ExchangeOutcome {
                        attempts: attempt + 1,
                        notification_received,
                    });
                }
                Err(err) if err.is_transport() => {
                    warn!(
                        "{} for device at {} (attempt {}/{}): {}",
                        err.transport_kind(),
                        address,
                        attempt + 1,
                        max_attempts,
                        err
                    );

                    if attempt + 1 == max_attempts {
                        error!("All connection attempts failed for device at {}", address);
                        return Err(Error::AttemptsExhausted {
                            address: address.to_string(),
                            attempts: max_attempts,
                            source: Box::new(err),
                        });
                    }

                    let wait = self.config.backoff(attempt);
                    debug!(
                        "Waiting {:?} before retry for device at {}",
                        wait, address
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    error!(
                        "Unexpected error polling device at {} (attempt {}/{}): {}",
                        address,
                        attempt + 1,
                        max_attempts,
                        err
                    );
                    return Err(Error::Unexpected {
                        address: address.to_string(),
                        attempt: attempt + 1,
                        source: Box::new(err),
                    });
                }
            }
        }

        Err(Error::Internal("retry loop ended without an outcome".to_string()))
    }

    /// One attempt. Returns whether a notification arrived.
    async fn attempt(
        &self,
        handle: &T::Handle,
        request_pairing: bool,
        on_notify: NotificationCallback,
        waiter: &NotificationWaiter,
    ) -> Result<bool> {
        self.set_state(ConnectionState::Connecting);
        let session = self.connect(handle).await?;
        let mut guard = SessionGuard::new(self.transport.clone(), session, self.state.clone());
        self.set_state(ConnectionState::Connected);

        let exchanged = self
            .notify_exchange(&mut guard, request_pairing, on_notify, waiter)
            .await;

        self.set_state(ConnectionState::Disconnecting);
        let released = guard.release(self.config.connect_timeout).await;

        let received = exchanged?;
        released?;
        Ok(received)
    }

    async fn connect(&self, handle: &T::Handle) -> Result<T::Session> {
        let timeout = self.config.connect_timeout;

        let (calls, delay) = match self.config.connect_strategy {
            ConnectStrategy::Direct => (1, Duration::ZERO),
            ConnectStrategy::Establish { attempts, delay } => (attempts.max(1), delay),
        };

        let mut call = 1;
        loop {
            let result = bounded(timeout, self.transport.connect(handle, timeout)).await;

            match result {
                Err(err) if err.is_transport() && call < calls => {
                    debug!("Connect call {}/{} failed: {}", call, calls, err);
                    call += 1;
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn notify_exchange(
        &self,
        guard: &mut SessionGuard<T>,
        request_pairing: bool,
        on_notify: NotificationCallback,
        waiter: &NotificationWaiter,
    ) -> Result<bool> {
        let timeout = self.config.connect_timeout;

        if request_pairing {
            match bounded(timeout, self.transport.pair(guard.session()?)).await? {
                PairOutcome::Paired => info!("Paired with device"),
                PairOutcome::Unsupported => debug!("Transport has no pairing step, skipping"),
            }
        }

        bounded(
            timeout,
            self.transport
                .subscribe(guard.session()?, self.characteristic, on_notify),
        )
        .await?;
        guard.subscribed = Some(self.characteristic);
        debug!(
            "Started notification listener for characteristic {}",
            self.characteristic
        );

        let received = waiter.wait(self.config.notification_timeout).await;
        if received {
            debug!("Received notification from device");
        } else {
            warn!(
                "Timeout waiting for notification after {:?}",
                self.config.notification_timeout
            );
        }

        let unsubscribed = bounded(
            timeout,
            self.transport
                .unsubscribe(guard.session()?, self.characteristic),
        )
        .await;
        guard.subscribed = None;
        unsubscribed?;
        debug!("Stopped notification listener");

        Ok(received)
    }
}
