//! Connection lifecycle and engine orchestration.
//!
//! [`connection`] holds the per-device `statig` state machine; [`slot_table`]
//! runs one actor task per device handle on top of it; [`engine`] wires
//! discovery, pairing, and the slot table into a single start/stop surface.

pub mod connection;
pub mod engine;
pub mod slot_table;

pub use connection::{ConnectionEvent, ConnectionState, Connector};
pub use engine::{Engine, EngineConfig, EngineLifecycle};
pub use slot_table::{SlotCommand, SlotTable};
