//! Acquisition coordinator.
//!
//! Wires reachability, the pairing window, the session manager and the
//! payload decoder into one poll cycle, and holds the last-known reading.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::connection::ConnectionState;
use crate::ble::transport::{Discovery, NotificationCallback, Transport};
use crate::ble::uuids::SENSE_STATUS_CHARACTERISTIC_UUID;
use crate::config::CoordinatorConfig;
use crate::data::{DeviceIdentity, EntryStore, PairingState, SensorReading, PAIRED_ONCE_KEY};
use crate::error::{Error, Result};
use crate::notify::NotificationWaiter;
use crate::poll::PollPolicy;
use crate::protocol::parse_status;
use crate::session::SessionManager;

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Observable events of the acquisition path.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    /// A poll cycle started.
    CycleStarted,
    /// A notification was decoded into a new reading.
    ReadingUpdated(SensorReading),
    /// The wait for a notification timed out; the reading is unchanged.
    NotificationTimeout,
    /// A poll cycle completed.
    CycleSucceeded {
        /// Attempts used.
        attempts: u32,
        /// Whether fresh data arrived.
        notification_received: bool,
    },
    /// The device was not reachable.
    DeviceUnavailable,
    /// A poll cycle failed.
    CycleFailed {
        /// Error description.
        reason: String,
    },
    /// The device completed its first cycle and was marked paired.
    Paired,
}

/// Polls one device and holds its last-known reading.
pub struct AcquisitionCoordinator<D, T>
where
    D: Discovery,
    T: Transport<Handle = D::Handle>,
{
    /// Identity of the polled device.
    identity: DeviceIdentity,
    /// Reachability collaborator.
    discovery: Arc<D>,
    /// Retrying exchange runner.
    sessions: SessionManager<T>,
    /// Durable entry data.
    store: Arc<dyn EntryStore>,
    /// Configuration.
    config: CoordinatorConfig,
    /// Poll eligibility gate.
    policy: PollPolicy,
    /// Last-known reading, replaced whole on every decode.
    reading: Arc<RwLock<SensorReading>>,
    /// Wall-clock time of the last decode.
    last_update: Arc<RwLock<Option<DateTime<Utc>>>>,
    /// Start of the last poll cycle.
    last_poll: RwLock<Option<Instant>>,
    /// Pairing progress.
    pairing: RwLock<PairingState>,
    /// Whether `paired_once` is known to be in the store.
    pairing_persisted: AtomicBool,
    /// Whether the last cycle succeeded.
    available: AtomicBool,
    /// Signaled by the notification handler.
    waiter: NotificationWaiter,
    /// Serializes poll cycles.
    cycle_lock: Mutex<()>,
    /// Event channel.
    event_tx: broadcast::Sender<AcquisitionEvent>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl<D, T> AcquisitionCoordinator<D, T>
where
    D: Discovery,
    T: Transport<Handle = D::Handle>,
{
    /// Create a coordinator for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the configuration is invalid.
    pub fn new(
        identity: DeviceIdentity,
        discovery: Arc<D>,
        transport: Arc<T>,
        store: Arc<dyn EntryStore>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let pairing = PairingState::load(store.as_ref());
        debug!(
            "Initializing coordinator for {} (paired once: {})",
            identity, pairing.paired_once
        );

        let (event_tx, _) = broadcast::channel(32);

        Ok(Self {
            sessions: SessionManager::new(
                transport,
                config.clone(),
                SENSE_STATUS_CHARACTERISTIC_UUID,
            ),
            policy: PollPolicy::new(config.poll_interval),
            identity,
            discovery,
            store,
            config,
            reading: Arc::new(RwLock::new(SensorReading::new())),
            last_update: Arc::new(RwLock::new(None)),
            last_poll: RwLock::new(None),
            pairing_persisted: AtomicBool::new(pairing.paired_once),
            pairing: RwLock::new(pairing),
            available: AtomicBool::new(false),
            waiter: NotificationWaiter::new(),
            cycle_lock: Mutex::new(()),
            event_tx,
            callback_counter: AtomicU64::new(0),
        })
    }

    // === Identification ===

    /// Identity of the polled device.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // === State ===

    /// Snapshot of the last-known reading.
    pub fn reading(&self) -> SensorReading {
        self.reading.read().clone()
    }

    /// Wall-clock time of the last decoded notification.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read()
    }

    /// Time since the last poll cycle started, `None` if never polled.
    pub fn since_last_poll(&self) -> Option<Duration> {
        self.last_poll.read().map(|started| started.elapsed())
    }

    /// Whether the last poll cycle succeeded.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Current pairing progress.
    pub fn pairing_state(&self) -> PairingState {
        *self.pairing.read()
    }

    /// Connection state of the in-flight cycle.
    pub fn connection_state(&self) -> ConnectionState {
        self.sessions.state()
    }

    /// Whether a poll cycle is in progress.
    pub fn is_polling(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Whether discovery currently sees the device.
    pub fn is_reachable(&self) -> bool {
        self.discovery.reachable(self.identity.address()).is_some()
    }

    /// Whether a poll should be attempted now.
    pub fn needs_poll(&self, host_running: bool) -> bool {
        let since_last_poll = self.since_last_poll();
        let reachable = self.is_reachable();
        let needs_poll = self
            .policy
            .needs_poll(host_running, since_last_poll, reachable);

        debug!(
            "Device {} needs poll: {} (since last poll: {:?}, reachable: {})",
            self.identity.address(),
            needs_poll,
            since_last_poll,
            reachable
        );
        needs_poll
    }

    // === Events ===

    /// Subscribe to acquisition events.
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback for acquisition events.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(AcquisitionEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.event_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event callback lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    fn emit(&self, event: AcquisitionEvent) {
        let _ = self.event_tx.send(event);
    }

    // === Polling ===

    /// Run one poll cycle and return the (possibly unchanged) reading.
    ///
    /// Cycles never overlap; a call made while another cycle is in flight
    /// waits for it to finish.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceUnavailable`] if discovery does not see the device
    /// - [`Error::AttemptsExhausted`] if every connection attempt failed
    /// - [`Error::Unexpected`] for any non-transport failure
    pub async fn poll(&self) -> Result<SensorReading> {
        let _cycle = self.cycle_lock.lock().await;
        let address = self.identity.address();

        debug!("Starting data update for device at {}", address);
        *self.last_poll.write() = Some(Instant::now());
        self.emit(AcquisitionEvent::CycleStarted);

        self.pairing_delay().await;

        let Some(handle) = self.discovery.reachable(address) else {
            let err = Error::DeviceUnavailable {
                address: address.to_string(),
            };
            warn!("{}", err);
            self.set_available(false);
            self.emit(AcquisitionEvent::DeviceUnavailable);
            return Err(err);
        };

        self.waiter.reset();
        let request_pairing = self.pairing.read().needs_pairing();

        let outcome = self
            .sessions
            .exchange(
                &handle,
                address,
                request_pairing,
                self.notification_handler(),
                &self.waiter,
            )
            .await;

        match outcome {
            Ok(outcome) => {
                if !outcome.notification_received {
                    self.emit(AcquisitionEvent::NotificationTimeout);
                }
                self.record_paired();
                self.set_available(true);
                self.emit(AcquisitionEvent::CycleSucceeded {
                    attempts: outcome.attempts,
                    notification_received: outcome.notification_received,
                });

                let reading = self.reading();
                debug!("Returning data from device at {}: {}", address, reading);
                Ok(reading)
            }
            Err(err) => {
                self.set_available(false);
                self.emit(AcquisitionEvent::CycleFailed {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Sleep through the pairing window before the first connection to a
    /// never-paired device. Runs at most once per process.
    async fn pairing_delay(&self) {
        let Some(window) = self.config.pairing_window else {
            return;
        };

        let owed = self.pairing.read().needs_pairing_delay();
        if !owed {
            return;
        }

        info!(
            "Waiting {:?} for {} to enter pairing mode",
            window, self.identity
        );
        tokio::time::sleep(window).await;
        self.pairing.write().consume_pairing_delay();
    }

    /// Decode each notification, swap the snapshot in, then signal.
    fn notification_handler(&self) -> NotificationCallback {
        let reading = self.reading.clone();
        let last_update = self.last_update.clone();
        let waiter = self.waiter.clone();
        let event_tx = self.event_tx.clone();

        Arc::new(move |data: &[u8]| {
            match parse_status(data) {
                Ok(snapshot) => {
                    *reading.write() = snapshot.clone();
                    *last_update.write() = Some(Utc::now());
                    let _ = event_tx.send(AcquisitionEvent::ReadingUpdated(snapshot));
                }
                Err(e) => warn!("Keeping previous reading: {}", e),
            }
            waiter.signal();
        })
    }

    /// Set `paired_once` on the first successful cycle and persist it.
    ///
    /// A failed write is logged and retried on the next successful cycle.
    fn record_paired(&self) {
        let first = self.pairing.write().mark_paired();
        if first {
            self.emit(AcquisitionEvent::Paired);
        }

        if self.pairing_persisted.load(Ordering::SeqCst) {
            return;
        }

        match self.store.set_flag(PAIRED_ONCE_KEY, true) {
            Ok(()) => {
                self.pairing_persisted.store(true, Ordering::SeqCst);
                info!("Marked {} as paired", self.identity);
            }
            Err(e) => warn!("Failed to persist pairing state for {}: {}", self.identity, e),
        }
    }

    fn set_available(&self, available: bool) {
        let was_available = self.available.swap(available, Ordering::SeqCst);
        if was_available && !available {
            info!("Device {} is unavailable", self.identity.address());
        } else if !was_available && available {
            info!("Device {} is available", self.identity.address());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::pairing::MockEntryStore;
    use crate::data::MemoryEntryStore;
    use crate::mock::{ConnectBehavior, MockDiscovery, MockTransport, TransportCall};
    use crate::protocol::MIN_STATUS_SIZE;
    use pretty_assertions::assert_eq;

    type MockCoordinator = AcquisitionCoordinator<MockDiscovery, MockTransport>;

    fn payload(grease_filter: u8) -> Vec<u8> {
        let mut data = vec![0u8; MIN_STATUS_SIZE];
        data[0..2].copy_from_slice(&10_000u16.to_le_bytes());
        data[59] = grease_filter;
        data
    }

    fn coordinator(
        transport: Arc<MockTransport>,
        store: Arc<dyn EntryStore>,
        config: CoordinatorConfig,
    ) -> MockCoordinator {
        AcquisitionCoordinator::new(
            DeviceIdentity::new("C4:DE:E2:11:22:33", "Roroshetta Sense"),
            Arc::new(MockDiscovery::new(true)),
            transport,
            store,
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = AcquisitionCoordinator::new(
            DeviceIdentity::new("AA", "x"),
            Arc::new(MockDiscovery::new(true)),
            Arc::new(MockTransport::new()),
            Arc::new(MemoryEntryStore::new()),
            CoordinatorConfig::default().retry(0, Duration::from_secs(1)),
        );
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state() {
        let coordinator = coordinator(
            Arc::new(MockTransport::new()),
            Arc::new(MemoryEntryStore::new()),
            CoordinatorConfig::active(),
        );
        assert!(coordinator.reading().is_empty());
        assert!(!coordinator.is_available());
        assert_eq!(coordinator.since_last_poll(), None);
        assert_eq!(coordinator.last_update(), None);
        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
        assert!(coordinator.needs_poll(true));
        assert!(!coordinator.needs_poll(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_decoded_reading() {
        let transport = Arc::new(MockTransport::with_payloads(vec![payload(42)]));
        let coordinator = coordinator(
            transport.clone(),
            Arc::new(MemoryEntryStore::new()),
            CoordinatorConfig::active(),
        );

        let reading = coordinator.poll().await.unwrap();

        assert_eq!(reading.temperature, Some(50.0));
        assert_eq!(reading.grease_filter, Some(42));
        assert_eq!(coordinator.reading(), reading);
        assert!(coordinator.is_available());
        assert!(coordinator.last_update().is_some());
        assert!(!coordinator.needs_poll(true));
        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::Connect,
                TransportCall::Pair,
                TransportCall::Subscribe(SENSE_STATUS_CHARACTERISTIC_UUID),
                TransportCall::Unsubscribe(SENSE_STATUS_CHARACTERISTIC_UUID),
                TransportCall::Disconnect,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_paired_once_persisted_exactly_once() {
        let mut store = MockEntryStore::new();
        store.expect_get_flag().return_const(None::<bool>);
        store
            .expect_set_flag()
            .withf(|key, value| key == PAIRED_ONCE_KEY && *value)
            .times(1)
            .returning(|_, _| Ok(()));

        let transport = Arc::new(MockTransport::with_payloads(vec![payload(1)]));
        let coordinator = coordinator(transport.clone(), Arc::new(store), CoordinatorConfig::active());

        for _ in 0..3 {
            coordinator.poll().await.unwrap();
        }

        assert!(coordinator.pairing_state().paired_once);
        // Pairing is only requested while unpaired.
        assert_eq!(transport.count(&TransportCall::Pair), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_does_not_fail_cycle() {
        let mut store = MockEntryStore::new();
        store.expect_get_flag().return_const(None::<bool>);
        store.expect_set_flag().times(1).returning(|key, _| {
            Err(Error::Persistence {
                key: key.to_string(),
                reason: "read-only".to_string(),
            })
        });

        let coordinator = coordinator(
            Arc::new(MockTransport::with_payloads(vec![payload(1)])),
            Arc::new(store),
            CoordinatorConfig::active(),
        );

        assert!(coordinator.poll().await.is_ok());
        assert!(coordinator.pairing_state().paired_once);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_persist_retried_on_next_cycle() {
        let mut store = MockEntryStore::new();
        store.expect_get_flag().return_const(None::<bool>);
        let mut writes = 0;
        store
            .expect_set_flag()
            .withf(|key, value| key == PAIRED_ONCE_KEY && *value)
            .times(2)
            .returning(move |key, _| {
                writes += 1;
                if writes == 1 {
                    Err(Error::Persistence {
                        key: key.to_string(),
                        reason: "storage busy".to_string(),
                    })
                } else {
                    Ok(())
                }
            });

        let transport = Arc::new(MockTransport::with_payloads(vec![payload(1)]));
        let coordinator = coordinator(transport.clone(), Arc::new(store), CoordinatorConfig::active());
        let mut rx = coordinator.subscribe();

        for _ in 0..3 {
            coordinator.poll().await.unwrap();
        }

        let paired_events = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|event| *event == AcquisitionEvent::Paired)
            .count();
        assert_eq!(paired_events, 1);
        assert_eq!(transport.count(&TransportCall::Pair), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_paired_skips_pair_and_window() {
        let transport = Arc::new(MockTransport::new());
        let coordinator = coordinator(
            transport.clone(),
            Arc::new(MemoryEntryStore::paired()),
            CoordinatorConfig::default(),
        );

        let start = Instant::now();
        coordinator.poll().await.unwrap();

        assert_eq!(transport.count(&TransportCall::Pair), 0);
        // Only the notification wait elapsed, no pairing window.
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_successful_cycle() {
        let coordinator = coordinator(
            Arc::new(MockTransport::with_payloads(vec![payload(7)])),
            Arc::new(MemoryEntryStore::new()),
            CoordinatorConfig::active(),
        );
        let mut rx = coordinator.subscribe();

        let reading = coordinator.poll().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), AcquisitionEvent::CycleStarted);
        assert_eq!(
            rx.recv().await.unwrap(),
            AcquisitionEvent::ReadingUpdated(reading)
        );
        assert_eq!(rx.recv().await.unwrap(), AcquisitionEvent::Paired);
        assert_eq!(
            rx.recv().await.unwrap(),
            AcquisitionEvent::CycleSucceeded {
                attempts: 1,
                notification_received: true,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_marks_unavailable() {
        let transport = Arc::new(MockTransport::with_payloads(vec![payload(7)]));
        let coordinator = coordinator(
            transport.clone(),
            Arc::new(MemoryEntryStore::new()),
            CoordinatorConfig::active(),
        );

        coordinator.poll().await.unwrap();
        assert!(coordinator.is_available());

        transport.script_connects([ConnectBehavior::FailUnexpected]);
        let err = coordinator.poll().await.unwrap_err();

        assert!(matches!(err, Error::Unexpected { attempt: 1, .. }));
        assert!(!coordinator.is_available());
        // Last valid snapshot survives the failure.
        assert_eq!(coordinator.reading().grease_filter, Some(7));
    }
}
