//! BLE connection management.
//!
//! btleplug-backed [`Transport`] for the Sense status characteristic.

use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::transport::{NotificationCallback, PairOutcome, Transport};
use crate::error::{Error, Result};

/// Connection state of the polled device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to the device.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the device.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// A live btleplug connection.
pub struct BleSession {
    peripheral: Peripheral,
    characteristics: CharacteristicHandler,
}

impl BleSession {
    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }
}

/// [`Transport`] over the platform Bluetooth stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct BtleplugTransport;

impl BtleplugTransport {
    /// Create a new transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    type Handle = Peripheral;
    type Session = BleSession;

    async fn connect(&self, handle: &Peripheral, timeout: Duration) -> Result<BleSession> {
        if handle.is_connected().await.unwrap_or(false) {
            info!("Peripheral already connected at BLE level");
        } else {
            match tokio::time::timeout(timeout, handle.connect()).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::ConnectTimeout { timeout }),
            }
        }

        if let Err(e) = handle.discover_services().await {
            // Leave the link down; the session never existed.
            if let Err(disconnect_err) = handle.disconnect().await {
                warn!(
                    "Failed to disconnect after service discovery error: {}",
                    disconnect_err
                );
            }
            return Err(Error::Bluetooth(e));
        }

        let characteristics = CharacteristicHandler::new(handle.clone());
        characteristics.discover_characteristics();

        debug!("Connected to {}", handle.address());

        Ok(BleSession {
            peripheral: handle.clone(),
            characteristics,
        })
    }

    async fn pair(&self, _session: &BleSession) -> Result<PairOutcome> {
        Ok(PairOutcome::Unsupported)
    }

    async fn subscribe(
        &self,
        session: &BleSession,
        characteristic: Uuid,
        on_notify: NotificationCallback,
    ) -> Result<()> {
        session
            .characteristics
            .subscribe(&characteristic, on_notify)
            .await
    }

    async fn unsubscribe(&self, session: &BleSession, characteristic: Uuid) -> Result<()> {
        session.characteristics.unsubscribe(&characteristic).await
    }

    async fn disconnect(&self, session: &BleSession) -> Result<()> {
        match session.peripheral.disconnect().await {
            Ok(()) => {
                debug!("Disconnected from {}", session.peripheral.address());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }
}
