//! Port traits for the ingestion engine.
//!
//! This module contains trait definitions that abstract external dependencies
//! and I/O operations, following the hexagonal architecture pattern. These
//! traits enable dependency injection and testing with mock implementations.

pub mod ble_transport;
pub mod event_sink;

pub use ble_transport::{BleTransport, DeviceSession};
pub use event_sink::EventSink;
