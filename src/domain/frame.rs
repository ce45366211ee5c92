//! The ephemeral unit the SubscriptionManager hands to the Demultiplexer.

use crate::domain::device::DeviceHandle;
use std::time::SystemTime;
use uuid::Uuid;

/// A raw, undecoded GATT value-changed payload. Immutable once created;
/// consumed by exactly one decoder then dropped (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub handle: DeviceHandle,
    pub characteristic_uuid: Uuid,
    pub bytes: Vec<u8>,
    pub arrived_at: SystemTime,
}
