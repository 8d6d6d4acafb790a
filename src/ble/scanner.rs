//! BLE scanning functionality.
//!
//! Provides the scanner that keeps track of which peripherals are currently
//! visible, answering reachability queries for the poll path.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

use crate::ble::transport::Discovery;
use crate::data::DeviceIdentity;
use crate::error::{Error, Result};

/// How long a peripheral counts as reachable after it was last seen.
pub const DEFAULT_VISIBILITY_WINDOW: Duration = Duration::from_secs(30);

/// A peripheral seen while scanning.
#[derive(Debug, Clone)]
pub struct SeenPeripheral {
    /// The peripheral handle.
    pub peripheral: Peripheral,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// When the peripheral was last seen.
    pub last_seen: Instant,
}

type SeenMap = Arc<RwLock<HashMap<String, SeenPeripheral>>>;

/// BLE scanner tracking visible peripherals by address.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Whether scanning is currently active.
    is_scanning: Arc<AtomicBool>,
    /// Visible peripherals keyed by upper-case address.
    seen: SeenMap,
    /// How long a sighting stays valid.
    visibility_window: Duration,
    /// Handle to the scanning task.
    scan_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl BleScanner {
    /// Create a new BLE scanner on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            is_scanning: Arc::new(AtomicBool::new(false)),
            seen: Arc::new(RwLock::new(HashMap::new())),
            visibility_window: DEFAULT_VISIBILITY_WINDOW,
            scan_handle: RwLock::new(None),
        }
    }

    /// Set how long a sighting keeps a peripheral reachable.
    pub fn set_visibility_window(&mut self, window: Duration) {
        self.visibility_window = window;
    }

    /// Start scanning.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn start_scanning(&self) -> Result<()> {
        if self.is_scanning.load(Ordering::SeqCst) {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan");

        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        self.is_scanning.store(true, Ordering::SeqCst);

        let adapter = self.adapter.clone();
        let is_scanning = self.is_scanning.clone();
        let seen = self.seen.clone();

        let handle = tokio::spawn(async move {
            while is_scanning.load(Ordering::SeqCst) {
                tokio::select! {
                    event = events.next() => match event {
                        Some(event) => Self::handle_event(event, &adapter, &seen).await,
                        None => {
                            error!("Adapter event stream ended");
                            break;
                        }
                    },
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                }
            }

            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop scanning.
    pub async fn stop_scanning(&self) -> Result<()> {
        if !self.is_scanning.swap(false, Ordering::SeqCst) {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        let handle = self.scan_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.is_scanning.load(Ordering::SeqCst)
    }

    /// All peripherals currently within the visibility window.
    pub fn visible(&self) -> Vec<SeenPeripheral> {
        self.seen
            .read()
            .values()
            .filter(|p| p.last_seen.elapsed() <= self.visibility_window)
            .cloned()
            .collect()
    }

    /// Identity of the strongest visible peripheral advertising `name`.
    pub fn find_by_name(&self, name: &str) -> Option<DeviceIdentity> {
        self.visible()
            .into_iter()
            .filter(|p| p.name.as_deref() == Some(name))
            .max_by_key(|p| p.rssi.unwrap_or(i16::MIN))
            .map(|p| DeviceIdentity::new(p.peripheral.address().to_string(), name))
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Handle a BLE central event.
    async fn handle_event(event: CentralEvent, adapter: &Adapter, seen: &SeenMap) {
        match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ManufacturerDataAdvertisement { id, .. }
            | CentralEvent::ServiceDataAdvertisement { id, .. }
            | CentralEvent::ServicesAdvertisement { id, .. } => {
                Self::process_peripheral(adapter, id, seen).await;
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
            }
            _ => {}
        }
    }

    /// Record a sighting of a peripheral.
    async fn process_peripheral(adapter: &Adapter, id: PeripheralId, seen: &SeenMap) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let address = properties.address.to_string().to_uppercase();
        trace!("Saw {} ({:?})", address, properties.local_name);

        seen.write().insert(
            address,
            SeenPeripheral {
                peripheral,
                name: properties.local_name,
                rssi: properties.rssi,
                last_seen: Instant::now(),
            },
        );
    }
}

impl Discovery for BleScanner {
    type Handle = Peripheral;

    fn reachable(&self, address: &str) -> Option<Peripheral> {
        let seen = self.seen.read();
        seen.get(&address.to_uppercase())
            .filter(|p| p.last_seen.elapsed() <= self.visibility_window)
            .map(|p| p.peripheral.clone())
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        self.is_scanning.store(false, Ordering::SeqCst);
    }
}
