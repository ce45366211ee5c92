//! Typed measurement payloads delivered by the decoders.
//!
//! These are plain tagged variants, not an inheritance tree: a
//! `BloodPressureMeasurement` and a `TemperatureMeasurement` share no base
//! type beyond the `Measurement` enum that wraps them for transport to the
//! `EventSink`.

use crate::domain::device::DeviceHandle;
use std::time::SystemTime;

/// The unit a temperature reading is expressed in. Always explicit — never
/// inferred by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

/// A decoded blood-pressure reading. `valid` records whether §4.6's
/// plausibility bounds held; `in_normal_range` additionally records whether
/// the reading fell within the configured (non-warning) normal range. Both
/// flags are informational — the measurement is delivered either way.
#[derive(Debug, Clone, PartialEq)]
pub struct BloodPressureMeasurement {
    pub handle: DeviceHandle,
    pub systolic_mmhg: f64,
    pub diastolic_mmhg: f64,
    pub heart_rate_bpm: Option<f64>,
    pub timestamp: SystemTime,
    pub valid: bool,
    pub in_normal_range: Option<bool>,
}

/// A decoded temperature reading, in whatever unit the source flags byte
/// declared.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureMeasurement {
    pub handle: DeviceHandle,
    pub temperature: f64,
    pub unit: TemperatureUnit,
    pub timestamp: SystemTime,
    pub valid: bool,
    pub in_normal_range: Option<bool>,
}

/// Either measurement kind, as handed to the `EventSink`.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    BloodPressure(BloodPressureMeasurement),
    Temperature(TemperatureMeasurement),
}

impl Measurement {
    /// The originating device's handle, regardless of variant.
    pub fn handle(&self) -> DeviceHandle {
        match self {
            Measurement::BloodPressure(m) => m.handle,
            Measurement::Temperature(m) => m.handle,
        }
    }

    /// Whether the measurement passed §4.6's plausibility validation.
    pub fn is_valid(&self) -> bool {
        match self {
            Measurement::BloodPressure(m) => m.valid,
            Measurement::Temperature(m) => m.valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> DeviceHandle {
        DeviceHandle::new(1)
    }

    #[test]
    fn measurement_handle_delegates_to_variant() {
        let m = Measurement::Temperature(TemperatureMeasurement {
            handle: handle(),
            temperature: 36.5,
            unit: TemperatureUnit::Celsius,
            timestamp: SystemTime::now(),
            valid: true,
            in_normal_range: Some(true),
        });
        assert_eq!(m.handle(), handle());
        assert!(m.is_valid());
    }
}
