//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy plumbing for finding the
//! device and exchanging one notification with it.

pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use characteristics::CharacteristicHandler;
pub use connection::{BleSession, BtleplugTransport, ConnectionState};
pub use scanner::BleScanner;
pub use transport::{Discovery, NotificationCallback, PairOutcome, Transport};
pub use uuids::*;
