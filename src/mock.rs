//! Mock collaborators for testing.
//!
//! [`MockDiscovery`] and [`MockTransport`] stand in for the radio so the
//! acquisition path can be exercised without BLE hardware.
//!
//! # Features
//!
//! - **Failure injection**: script the outcome of each connect call
//! - **Notification injection**: payloads delivered in order on subscribe
//! - **Call recording**: every transport call is logged for assertions

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::ble::transport::{Discovery, NotificationCallback, PairOutcome, Transport};
use crate::error::{Error, Result};

/// Connectable handle produced by [`MockDiscovery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandle {
    /// Address the handle was looked up with.
    pub address: String,
}

/// Discovery with a switchable reachability flag.
#[derive(Debug)]
pub struct MockDiscovery {
    reachable: AtomicBool,
    lookups: AtomicU32,
}

impl MockDiscovery {
    /// Create a discovery that reports every address as `reachable`.
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            lookups: AtomicU32::new(0),
        }
    }

    /// Change reachability.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of reachability lookups so far.
    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Discovery for MockDiscovery {
    type Handle = MockHandle;

    fn reachable(&self, address: &str) -> Option<MockHandle> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.reachable
            .load(Ordering::SeqCst)
            .then(|| MockHandle {
                address: address.to_string(),
            })
    }
}

/// Scripted outcome of one connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Connect succeeds.
    Succeed,
    /// Connect fails with a transport error.
    FailTransport,
    /// Connect fails with a non-transport error.
    FailUnexpected,
    /// Connect never completes.
    Hang,
}

/// A transport call, as recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `connect` was called.
    Connect,
    /// `pair` was called.
    Pair,
    /// `subscribe` was called for a characteristic.
    Subscribe(Uuid),
    /// `unsubscribe` was called for a characteristic.
    Unsubscribe(Uuid),
    /// `disconnect` was called.
    Disconnect,
}

/// Session handed out by [`MockTransport`].
#[derive(Debug)]
pub struct MockSession {
    /// Sequence number of the connect call that produced it.
    pub id: u32,
}

/// Transport with scripted behavior.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<ConnectBehavior>>,
    payloads: RwLock<Vec<Vec<u8>>>,
    pair_outcome: RwLock<PairOutcome>,
    fail_subscribe: AtomicBool,
    hang_subscribe: AtomicBool,
    fail_disconnect: AtomicBool,
    calls: Mutex<Vec<TransportCall>>,
    sessions: AtomicU32,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a transport that always connects and never notifies.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            payloads: RwLock::new(Vec::new()),
            pair_outcome: RwLock::new(PairOutcome::Unsupported),
            fail_subscribe: AtomicBool::new(false),
            hang_subscribe: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            sessions: AtomicU32::new(0),
        }
    }

    /// Create a transport that delivers `payloads` on every subscribe.
    pub fn with_payloads(payloads: Vec<Vec<u8>>) -> Self {
        let transport = Self::new();
        *transport.payloads.write() = payloads;
        transport
    }

    /// Queue outcomes for the next connect calls. Once the script is used
    /// up, connects succeed.
    pub fn script_connects(&self, behaviors: impl IntoIterator<Item = ConnectBehavior>) {
        self.script.lock().extend(behaviors);
    }

    /// Replace the payloads delivered on subscribe.
    pub fn set_payloads(&self, payloads: Vec<Vec<u8>>) {
        *self.payloads.write() = payloads;
    }

    /// Set what `pair` reports.
    pub fn set_pair_outcome(&self, outcome: PairOutcome) {
        *self.pair_outcome.write() = outcome;
    }

    /// Make `subscribe` fail with a transport error.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make `subscribe` never complete.
    pub fn set_hang_subscribe(&self, hang: bool) {
        self.hang_subscribe.store(hang, Ordering::SeqCst);
    }

    /// Make `disconnect` fail with a transport error.
    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &TransportCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Handle = MockHandle;
    type Session = MockSession;

    async fn connect(&self, handle: &MockHandle, _timeout: Duration) -> Result<MockSession> {
        self.record(TransportCall::Connect);
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(ConnectBehavior::Succeed);

        match behavior {
            ConnectBehavior::Succeed => Ok(MockSession {
                id: self.sessions.fetch_add(1, Ordering::SeqCst) + 1,
            }),
            ConnectBehavior::FailTransport => Err(Error::ConnectionFailed {
                reason: format!("simulated failure connecting to {}", handle.address),
            }),
            ConnectBehavior::FailUnexpected => {
                Err(Error::Internal("simulated unexpected failure".to_string()))
            }
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    async fn pair(&self, _session: &MockSession) -> Result<PairOutcome> {
        self.record(TransportCall::Pair);
        Ok(*self.pair_outcome.read())
    }

    async fn subscribe(
        &self,
        _session: &MockSession,
        characteristic: Uuid,
        on_notify: NotificationCallback,
    ) -> Result<()> {
        self.record(TransportCall::Subscribe(characteristic));
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::CharacteristicNotFound {
                uuid: characteristic.to_string(),
            });
        }
        if self.hang_subscribe.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }

        let payloads = self.payloads.read().clone();
        for payload in &payloads {
            on_notify(payload);
        }
        Ok(())
    }

    async fn unsubscribe(&self, _session: &MockSession, characteristic: Uuid) -> Result<()> {
        self.record(TransportCall::Unsubscribe(characteristic));
        Ok(())
    }

    async fn disconnect(&self, _session: &MockSession) -> Result<()> {
        self.record(TransportCall::Disconnect);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}
