//! GATT characteristic handling.
//!
//! Provides subscription to the notify characteristic of a connected
//! peripheral and forwarding of its notifications to a callback.

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::ble::transport::NotificationCallback;
use crate::error::{Error, Result};

/// Handler for GATT characteristics on a connected peripheral.
pub struct CharacteristicHandler {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Cached characteristics by UUID.
    characteristics: Arc<RwLock<HashMap<Uuid, Characteristic>>>,
    /// Handle to the notification forwarding task.
    listener_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a peripheral.
    ///
    /// Note: Services must be discovered before using this handler.
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: Arc::new(RwLock::new(HashMap::new())),
            listener_handle: RwLock::new(None),
        }
    }

    /// Discover and cache all characteristics.
    ///
    /// This should be called after connecting and discovering services.
    pub fn discover_characteristics(&self) {
        let services = self.peripheral.services();

        let mut chars = self.characteristics.write();
        chars.clear();

        for service in services {
            for characteristic in service.characteristics {
                trace!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid,
                    service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        debug!("Discovered {} characteristics", chars.len());
    }

    /// Check if a characteristic exists.
    pub fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristics.read().contains_key(uuid)
    }

    fn characteristic(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// Subscribe to notifications of `uuid`, forwarding each payload to
    /// `on_notify` in arrival order.
    pub async fn subscribe(&self, uuid: &Uuid, on_notify: NotificationCallback) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;

        // Take the stream before subscribing so the first push is not lost.
        let mut notifications = self.peripheral.notifications().await?;
        let target = *uuid;

        let handle = tokio::spawn(async move {
            debug!("Notification listener for {} started", target);
            while let Some(notification) = notifications.next().await {
                if notification.uuid != target {
                    trace!("Ignoring notification from {}", notification.uuid);
                    continue;
                }
                debug!(
                    "Received notification: {} bytes",
                    notification.value.len()
                );
                on_notify(&notification.value);
            }
            debug!("Notification listener for {} stopped", target);
        });

        if let Some(previous) = self.listener_handle.write().replace(handle) {
            previous.abort();
        }

        if let Err(e) = self.peripheral.subscribe(&characteristic).await {
            error!("Failed to subscribe to {}: {}", uuid, e);
            self.stop_listener();
            return Err(Error::Bluetooth(e));
        }

        debug!("Subscribed to notifications from {}", uuid);
        Ok(())
    }

    /// Unsubscribe from notifications of `uuid` and stop forwarding.
    pub async fn unsubscribe(&self, uuid: &Uuid) -> Result<()> {
        self.stop_listener();

        let characteristic = self.characteristic(uuid)?;
        self.peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Unsubscribed from notifications from {}", uuid);
        Ok(())
    }

    fn stop_listener(&self) {
        if let Some(handle) = self.listener_handle.write().take() {
            handle.abort();
        }
    }
}

impl Drop for CharacteristicHandler {
    fn drop(&mut self) {
        self.stop_listener();
    }
}
