//! Domain layer containing pure business logic and data types.
//!
//! This module contains all domain models and logic with no I/O dependencies,
//! following hexagonal architecture principles.

pub mod device;
pub mod frame;
pub mod ieee11073;
pub mod measurement;
pub mod reconnection;
pub mod validation;

pub use device::{Candidate, DeviceHandle, DeviceKind};
pub use frame::RawFrame;
pub use measurement::{
    BloodPressureMeasurement, Measurement, TemperatureMeasurement, TemperatureUnit,
};
pub use reconnection::{ConnectionStatus, ReconnectionPolicy};
pub use validation::{NormalRanges, Range, Validator};
