//! Collaborator traits for discovery and transport.
//!
//! The acquisition path is written against these traits so it can run over
//! btleplug ([`BleScanner`](super::scanner::BleScanner) and
//! [`BtleplugTransport`](super::connection::BtleplugTransport)) or over the
//! in-process mocks in [`crate::mock`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// Callback invoked with the payload of every inbound notification, in
/// arrival order.
pub type NotificationCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Result of an explicit pairing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// The link is paired.
    Paired,
    /// The transport has no explicit pairing step.
    Unsupported,
}

/// Near-real-time radio visibility of devices.
pub trait Discovery: Send + Sync {
    /// Connectable handle handed to the transport.
    type Handle: Clone + Send + Sync + 'static;

    /// Return a connectable handle if the device is currently reachable.
    fn reachable(&self, address: &str) -> Option<Self::Handle>;
}

/// A connection-oriented transport with one notify characteristic.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connectable handle, as produced by a [`Discovery`].
    type Handle: Send + Sync;
    /// Live connection, released by [`Transport::disconnect`].
    type Session: Send + Sync + 'static;

    /// Establish a connection within `timeout`.
    async fn connect(&self, handle: &Self::Handle, timeout: Duration) -> Result<Self::Session>;

    /// Request pairing on an established connection.
    async fn pair(&self, session: &Self::Session) -> Result<PairOutcome>;

    /// Start delivering notifications of `characteristic` to `on_notify`.
    async fn subscribe(
        &self,
        session: &Self::Session,
        characteristic: Uuid,
        on_notify: NotificationCallback,
    ) -> Result<()>;

    /// Stop delivering notifications of `characteristic`.
    async fn unsubscribe(&self, session: &Self::Session, characteristic: Uuid) -> Result<()>;

    /// Release the connection.
    async fn disconnect(&self, session: &Self::Session) -> Result<()>;
}
