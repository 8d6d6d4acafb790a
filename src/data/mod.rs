//! Data structures for device data.
//!
//! This module contains the sensor reading snapshot, the device identity,
//! and the pairing state with its persistence collaborator.

pub mod device;
pub mod pairing;
pub mod reading;

pub use device::DeviceIdentity;
pub use pairing::{EntryStore, MemoryEntryStore, PairingState, PAIRED_ONCE_KEY};
pub use reading::SensorReading;
