//! Temperature Measurement decoding per §4.5 and IEEE 11073-10408, with
//! vendor-format fallbacks for consumer-grade thermometers that pack raw
//! centi- or deci-degree integers instead of a conformant SFLOAT/FLOAT.

use crate::decode::DecodeError;
use crate::domain::device::DeviceHandle;
use crate::domain::ieee11073::{float_from_le_bytes, sfloat_from_le_bytes};
use crate::domain::measurement::{TemperatureMeasurement, TemperatureUnit};
use std::time::SystemTime;

const MIN_LEN: usize = 5;

fn plausible(value: f64) -> bool {
    value.is_finite() && value > 0.0 && value <= 100.0
}

/// Decodes Temperature Measurement frames, trying IEEE 11073 strategies
/// first and falling back to raw-integer interpretations observed on
/// consumer-grade devices.
#[derive(Debug, Default)]
pub struct TempDecoder;

impl TempDecoder {
    pub fn decode(&self, handle: DeviceHandle, frame: &[u8]) -> Result<TemperatureMeasurement, DecodeError> {
        if frame.len() < MIN_LEN {
            return Err(DecodeError::InsufficientBytes {
                need: MIN_LEN,
                got: frame.len(),
            });
        }
        let unit = if frame[0] & 0x01 != 0 {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        };

        // Strategy 1: IEEE 11073 FLOAT.
        let strategy1 = float_from_le_bytes([frame[1], frame[2], frame[3], frame[4]]);
        if plausible(strategy1) {
            return Ok(self.build(handle, strategy1, unit));
        }

        // Strategy 2: IEEE 11073 SFLOAT.
        let strategy2 = sfloat_from_le_bytes([frame[1], frame[2]]);
        if plausible(strategy2) {
            return Ok(self.build(handle, strategy2, unit));
        }

        // Strategy 3: raw little-endian u16, deci-degrees then centi-degrees.
        let raw = u16::from_le_bytes([frame[1], frame[2]]);
        let deci = raw as f64 / 10.0;
        if plausible(deci) {
            return Ok(self.build(handle, deci, unit));
        }
        let centi = raw as f64 / 100.0;
        if plausible(centi) {
            return Ok(self.build(handle, centi, unit));
        }

        // Strategy 4: integer degrees plus a tenths digit.
        let integer_plus_tenths = frame[1] as f64 + (frame[2] as f64) / 10.0;
        if plausible(integer_plus_tenths) {
            return Ok(self.build(handle, integer_plus_tenths, unit));
        }

        Err(DecodeError::AllStrategiesFailed)
    }

    fn build(&self, handle: DeviceHandle, temperature: f64, unit: TemperatureUnit) -> TemperatureMeasurement {
        TemperatureMeasurement {
            handle,
            temperature,
            unit,
            timestamp: SystemTime::now(),
            valid: false,
            in_normal_range: None,
        }
    }
}
