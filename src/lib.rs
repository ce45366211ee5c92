//! BLE ingestion engine for IEEE 11073 personal health devices.
//!
//! Discovers blood-pressure and thermometer peripherals, pairs and connects
//! to them, keeps each connection alive across drops and host BLE-stack
//! quirks, and decodes/validates their measurement frames into typed events
//! for a single consumer-supplied [`ports::event_sink::EventSink`].
//!
//! [`state::Engine`] is the entry point: construct one with a
//! [`ports::ble_transport::BleTransport`] (typically
//! [`adapters::BtleplugTransport`]) and an `EventSink`, then `start()` it.

pub mod adapters;
pub mod decode;
pub mod demux;
pub mod discovery;
pub mod domain;
pub mod health_probe;
pub mod ports;
pub mod state;
pub mod subscription;
