//! The produced interface: typed events the core delivers to a consumer.

use crate::domain::device::{DeviceHandle, DeviceKind};
use crate::domain::measurement::Measurement;
use async_trait::async_trait;

/// Connection-status values as observed at the event-sink boundary —
/// distinct from the transport's `LinkStatus` and from the Connector's
/// internal `ConnectionState`, though the names line up 1:1 with §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatusKind {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// A connection-lifecycle transition for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub handle: DeviceHandle,
    pub status: ConnectionStatusKind,
    pub error: Option<String>,
}

/// A decoded, validated measurement ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementEvent {
    pub handle: DeviceHandle,
    pub kind: DeviceKind,
    pub payload: Measurement,
    pub valid: bool,
}

/// A classified advertisement surfaced by the Scanner/Classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEvent {
    pub handle: DeviceHandle,
    pub kind: DeviceKind,
    pub rssi: i16,
}

/// Engine-wide status, independent of any single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    ScannerStopped,
    ScannerRestarting,
    Fatal,
}

/// The consumer-facing sink for everything the engine produces. All
/// methods are infallible from the engine's perspective — a sink that
/// fails to deliver (e.g. a full downstream queue) is the sink's problem,
/// not the engine's; it must not block the engine's internal pipelines
/// indefinitely.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_measurement(&self, event: MeasurementEvent);
    async fn on_status(&self, event: StatusEvent);
    async fn on_discovery(&self, event: DiscoveryEvent);
    async fn on_engine_status(&self, status: EngineStatus);
    /// A raw frame was dropped by the demultiplexer or decoder (§7).
    async fn on_decoder_dropped(&self, handle: DeviceHandle, reason: String);
}
