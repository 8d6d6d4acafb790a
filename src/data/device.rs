//! Device identity.

/// Immutable identity of the polled device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceIdentity {
    address: String,
    name: String,
}

impl DeviceIdentity {
    /// Create a new identity from a transport address and a display name.
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Transport address (MAC address on Linux/Windows, UUID on macOS).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}
