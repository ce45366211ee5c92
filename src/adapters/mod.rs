//! Adapter implementations.
//!
//! Concrete implementations of the port traits: the real `btleplug` backend,
//! an in-memory mock for tests and demos, and a `tracing`-backed event sink.

pub mod btleplug_transport;
pub mod mock_transport;
pub mod tracing_sink;

pub use btleplug_transport::BtleplugTransport;
pub use mock_transport::{MockDevice, MockTransport};
pub use tracing_sink::TracingEventSink;
