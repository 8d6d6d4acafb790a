//! Error types for the sense-rust-ble crate.

use std::time::Duration;
use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The device is not currently reachable by discovery.
    #[error("Device at {address} is not available for connection")]
    DeviceUnavailable {
        /// Address of the unreachable device.
        address: String,
    },

    /// Establishing the connection did not complete in time.
    #[error("Connection timeout after {timeout:?}")]
    ConnectTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Operation requires a connection but the device is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Invalid data was received from the device.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// The entry-data store could not persist a value.
    #[error("Failed to persist {key}: {reason}")]
    Persistence {
        /// The key being written.
        key: String,
        /// Why the write failed.
        reason: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Every connection attempt of a poll cycle failed with a transport error.
    #[error("All {attempts} connection attempts failed for device at {address}: {source}")]
    AttemptsExhausted {
        /// Address of the device.
        address: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last transport error.
        #[source]
        source: Box<Error>,
    },

    /// A non-transport error aborted the poll cycle.
    #[error("Unexpected error polling device at {address} (attempt {attempt}): {source}")]
    Unexpected {
        /// Address of the device.
        address: String,
        /// The attempt (1-based) during which the error occurred.
        attempt: u32,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Check if this is a transport-level failure that may be retried.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Bluetooth(_)
                | Self::ConnectTimeout { .. }
                | Self::ConnectionFailed { .. }
                | Self::NotConnected
                | Self::CharacteristicNotFound { .. }
        )
    }

    /// Short description of a transport failure, for log messages.
    pub fn transport_kind(&self) -> &'static str {
        match self {
            Self::ConnectTimeout { .. } => "Connection timeout",
            Self::Bluetooth(btleplug::Error::DeviceNotFound) => "Device not found",
            Self::Bluetooth(btleplug::Error::TimedOut(_)) => "Connection timeout",
            _ => {
                let message = self.to_string();
                if message.contains("ESP_GATT_CONN_FAIL_ESTABLISH") {
                    "GATT connection establishment failed (device may be busy or out of range)"
                } else if message.contains("Device not found") {
                    "Device not found"
                } else if message.to_lowercase().contains("timeout") {
                    "Connection timeout"
                } else {
                    "Bluetooth connection error"
                }
            }
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
