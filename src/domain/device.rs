//! Device identity and classification.
//!
//! A device is identified by a single canonical `u64` handle for the lifetime
//! of the process. Hex formatting only happens at `Display`, which is the
//! only place this type should ever be rendered as a string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a BLE peripheral, wrapping a 48-bit Bluetooth address
/// zero-extended into a `u64`. All internal comparisons, map keys, and
/// routing use the raw integer; only `Display` produces the colon-separated
/// hex form consumers expect at the event-sink boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    /// Build a handle from a raw 48-bit (or smaller) address value.
    pub fn new(raw: u64) -> Self {
        Self(raw & 0x0000_FFFF_FFFF_FFFF)
    }

    /// The raw integer value, suitable as a map key.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// The kind a device is classified as. Immutable once a slot is created for
/// the handle — the Classifier never re-tags an existing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// A blood-pressure monitor advertising service `0x1810` (or matched by
    /// local-name heuristic).
    BloodPressure,
    /// A clinical thermometer advertising service `0x1809` (or matched by
    /// local-name heuristic).
    Thermometer,
}

/// A classified advertisement, ready for the Pairer/Connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// The advertising device's handle.
    pub handle: DeviceHandle,
    /// The classified device kind.
    pub kind: DeviceKind,
    /// Received signal strength, in dBm.
    pub rssi: i16,
    /// The advertised local name, if any.
    pub local_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_colon_separated_hex() {
        let handle = DeviceHandle::new(0xAA_BB_CC_DD_EE_FF);
        assert_eq!(handle.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn new_truncates_to_48_bits() {
        let handle = DeviceHandle::new(0xFFFF_AA_BB_CC_DD_EE_FF);
        assert_eq!(handle.raw(), 0xAA_BB_CC_DD_EE_FF);
    }

    #[test]
    fn equal_raw_values_are_equal_handles() {
        assert_eq!(DeviceHandle::new(42), DeviceHandle::new(42));
    }
}
