//! The abstract BLE transport the core consumes.
//!
//! `BleTransport` and `DeviceSession` are the platform-neutral boundary:
//! the core never references a platform BLE stack directly. Shapes mirror
//! `btleplug::api` (`Service`, `Characteristic`, `CharPropFlags`) since an
//! adapter backed by `btleplug` is the reference implementation, but nothing
//! here depends on a particular backend.

use crate::domain::device::DeviceHandle;
use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use futures::stream::Stream;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Transport-level outcome codes. Every fallible transport operation must
/// distinguish at least these cases so the core can apply the right retry
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    AccessDenied,
    Unreachable,
    ProtocolError,
    Unknown,
}

/// An error surfaced by the transport, carrying the status code the core's
/// retry policies key on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("transport error: {0:?}")]
pub struct TransportError(pub StatusCode);

pub type TransportResult<T> = Result<T, TransportError>;

/// A raw advertisement observed during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub handle: DeviceHandle,
    pub local_name: Option<String>,
    pub service_uuids: Vec<Uuid>,
    pub rssi: i16,
}

/// A GATT characteristic, identified by UUID and tagged with its supported
/// operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharPropFlags,
}

/// A GATT service and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

/// The value written to a Client Characteristic Configuration Descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CccdValue {
    None,
    Notify,
    Indicate,
}

/// The outcome of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    Paired,
    AlreadyPaired,
    Failed,
}

/// A connection-status transition as reported by the transport itself
/// (distinct from the core's own `ConnectionState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

pub type AdvertisementStream = Pin<Box<dyn Stream<Item = Advertisement> + Send>>;
pub type RawFrameStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;
pub type LinkStatusStream = Pin<Box<dyn Stream<Item = LinkStatus> + Send>>;

/// A live session with one connected (or connecting) device. Dropping a
/// session does not disconnect it — callers must call `disconnect`
/// explicitly, matching the Connector's disconnect contract (§4.2).
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Fetch the device's GATT service catalogue.
    async fn services(&self) -> TransportResult<Vec<Service>>;

    /// Ensure the device is OS-paired. Idempotent: already-paired devices
    /// report `AlreadyPaired` rather than erroring.
    async fn pair(&self) -> TransportResult<PairingOutcome>;

    /// A stream of link-level connection status changes, independent of
    /// explicit connect/disconnect calls (e.g. unexpected loss).
    async fn connection_status_changes(&self) -> TransportResult<LinkStatusStream>;

    /// Read the current CCCD value for a characteristic.
    async fn read_cccd(&self, characteristic: &Characteristic) -> TransportResult<CccdValue>;

    /// Write a CCCD value to a characteristic.
    async fn write_cccd(
        &self,
        characteristic: &Characteristic,
        value: CccdValue,
    ) -> TransportResult<()>;

    /// Subscribe to value-changed notifications on a characteristic.
    /// Returns a stream of raw frame bytes.
    async fn subscribe(&self, characteristic: &Characteristic) -> TransportResult<RawFrameStream>;

    /// Best-effort disconnect. Must not panic or leave resources leaked
    /// even if the transport reports an error.
    async fn disconnect(&self) -> TransportResult<()>;
}

/// The platform-neutral BLE transport abstraction the core requires.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Begin scanning, filtered to the given service UUIDs (empty means
    /// unfiltered). Returns a stream of advertisements.
    async fn start_scan(&self, service_uuids: &[Uuid]) -> TransportResult<AdvertisementStream>;

    /// Stop scanning. Idempotent.
    async fn stop_scan(&self) -> TransportResult<()>;

    /// Open a session with a discovered device, performing connect and
    /// service discovery as a unit.
    async fn open_device(&self, handle: DeviceHandle) -> TransportResult<Box<dyn DeviceSession>>;
}
