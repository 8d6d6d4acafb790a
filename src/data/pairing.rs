//! Pairing state and its persistence.
//!
//! Whether the device has ever completed a poll cycle is durable and lives
//! in an opaque per-device entry store. The one-time pairing delay is
//! process-lifetime only.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::Result;

/// Entry-data key of the durable "has ever paired" flag.
pub const PAIRED_ONCE_KEY: &str = "paired_once";

/// Per-device entry-data store holding durable flags.
#[cfg_attr(test, mockall::automock)]
pub trait EntryStore: Send + Sync {
    /// Read a flag, `None` if it has never been written.
    fn get_flag(&self, key: &str) -> Option<bool>;

    /// Durably write a flag.
    fn set_flag(&self, key: &str, value: bool) -> Result<()>;
}

/// In-memory entry store.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    flags: RwLock<HashMap<String, bool>>,
}

impl MemoryEntryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with `paired_once` already set.
    pub fn paired() -> Self {
        let store = Self::new();
        store
            .flags
            .write()
            .insert(PAIRED_ONCE_KEY.to_string(), true);
        store
    }
}

impl EntryStore for MemoryEntryStore {
    fn get_flag(&self, key: &str) -> Option<bool> {
        self.flags.read().get(key).copied()
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        self.flags.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Pairing progress for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairingState {
    /// A poll cycle has completed at least once (persisted).
    pub paired_once: bool,
    /// The one-time pairing delay has been consumed (process lifetime).
    #[cfg_attr(feature = "serde", serde(skip))]
    pub pairing_delay_done: bool,
}

impl PairingState {
    /// Load the durable part of the state from a store.
    pub fn load(store: &dyn EntryStore) -> Self {
        Self {
            paired_once: store.get_flag(PAIRED_ONCE_KEY).unwrap_or(false),
            pairing_delay_done: false,
        }
    }

    /// Whether a connection should request pairing.
    pub fn needs_pairing(&self) -> bool {
        !self.paired_once
    }

    /// Whether the one-time pairing delay is still owed.
    pub fn needs_pairing_delay(&self) -> bool {
        !self.paired_once && !self.pairing_delay_done
    }

    /// Mark the pairing delay consumed. Returns `false` if it was not owed.
    pub fn consume_pairing_delay(&mut self) -> bool {
        if !self.needs_pairing_delay() {
            return false;
        }
        self.pairing_delay_done = true;
        true
    }

    /// Mark the device paired. Returns `true` only on the first transition.
    pub fn mark_paired(&mut self) -> bool {
        if self.paired_once {
            return false;
        }
        self.paired_once = true;
        true
    }
}
