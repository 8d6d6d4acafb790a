// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # sense-rust-ble
//!
//! A Rust library for polling environmental readings from a Roroshetta Sense
//! range-hood sensor over Bluetooth Low Energy.
//!
//! The device exposes one notifying characteristic carrying a fixed-layout
//! status payload. Each poll cycle connects, subscribes, waits for one
//! notification, decodes it and disconnects again.
//!
//! ## Features
//!
//! - **Bounded retries**: transport failures are retried with exponential backoff
//! - **Pairing window**: a one-time delay before the first connection to a new device
//! - **Poll gate**: polls only when due and when the device is reachable
//! - **Last-known reading**: malformed payloads and timeouts keep the previous snapshot
//! - **Pluggable transport**: the acquisition path runs over the [`Discovery`]
//!   and [`Transport`] traits, with btleplug and mock implementations provided
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sense_rust_ble::{
//!     AcquisitionCoordinator, BleScanner, BtleplugTransport, CoordinatorConfig,
//!     MemoryEntryStore, Result, SENSE_DEVICE_NAME,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scanner = Arc::new(BleScanner::new().await?);
//!     scanner.start_scanning().await?;
//!
//!     // Wait for the device to advertise
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     if let Some(identity) = scanner.find_by_name(SENSE_DEVICE_NAME) {
//!         let coordinator = AcquisitionCoordinator::new(
//!             identity,
//!             scanner.clone(),
//!             Arc::new(BtleplugTransport::new()),
//!             Arc::new(MemoryEntryStore::new()),
//!             CoordinatorConfig::default(),
//!         )?;
//!
//!         let reading = coordinator.poll().await?;
//!         println!("{}", reading);
//!     }
//!
//!     scanner.stop_scanning().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps. Peripheral addresses are UUIDs.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod mock;
pub mod notify;
pub mod poll;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod utils;

// Re-exports for convenience
pub use config::{ConnectStrategy, CoordinatorConfig};
pub use coordinator::{AcquisitionCoordinator, AcquisitionEvent, CallbackHandle};
pub use error::{Error, Result};
pub use notify::NotificationWaiter;
pub use poll::PollPolicy;
pub use scheduler::PollScheduler;
pub use session::{ExchangeOutcome, SessionManager};
pub use utils::celsius_to_fahrenheit;

// Re-export commonly used types from submodules
pub use ble::connection::{BtleplugTransport, ConnectionState};
pub use ble::scanner::BleScanner;
pub use ble::transport::{Discovery, NotificationCallback, PairOutcome, Transport};
pub use ble::uuids::{SENSE_DEVICE_NAME, SENSE_STATUS_CHARACTERISTIC_UUID};
pub use data::{DeviceIdentity, EntryStore, MemoryEntryStore, PairingState, SensorReading};
pub use protocol::parse_status;
