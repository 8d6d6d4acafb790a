//! BLE Characteristic UUIDs.
//!
//! Contains the UUID constants used for Roroshetta Sense communication.

use uuid::Uuid;

/// Environmental status characteristic UUID (Notify).
///
/// Every notification carries one fixed-layout sensor payload.
pub const SENSE_STATUS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_beef_1212_efde_1523_785fef13d123);

/// Advertised local name of the device.
pub const SENSE_DEVICE_NAME: &str = "Roroshetta Sense";

/// Check if a characteristic UUID is the environmental status characteristic.
pub fn is_status_characteristic(uuid: &Uuid) -> bool {
    *uuid == SENSE_STATUS_CHARACTERISTIC_UUID
}
