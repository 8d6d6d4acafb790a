//! Protocol module for parsing device payloads.
//!
//! The device pushes a single fixed-layout environmental status payload
//! over its notify characteristic.

pub mod status;

pub use status::{parse_status, MIN_STATUS_SIZE};
