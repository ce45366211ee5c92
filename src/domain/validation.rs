//! Medical plausibility validation for decoded measurements.
//!
//! Validation is two-tiered: a fixed plausibility range (§4.6) that a
//! measurement must fall within to be marked `valid`, and a configurable
//! "normal" range used only to flag `in_normal_range` for display purposes.
//! An out-of-normal-range reading is still delivered and still `valid`.

use crate::domain::measurement::{BloodPressureMeasurement, TemperatureMeasurement, TemperatureUnit};
use serde::{Deserialize, Serialize};

/// A closed numeric range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Configurable "normal" ranges used only for the `in_normal_range` flag,
/// not for plausibility validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalRanges {
    pub bp_systolic: Range,
    pub bp_diastolic: Range,
    pub bp_heart_rate: Range,
    pub temp_celsius: Range,
}

impl Default for NormalRanges {
    fn default() -> Self {
        Self {
            bp_systolic: Range { low: 90.0, high: 140.0 },
            bp_diastolic: Range { low: 60.0, high: 90.0 },
            bp_heart_rate: Range { low: 60.0, high: 100.0 },
            temp_celsius: Range { low: 36.0, high: 37.5 },
        }
    }
}

/// §4.6 fixed plausibility bounds — not configurable, since they encode
/// medical fact rather than display preference.
mod plausibility {
    use super::Range;

    pub const BP_SYSTOLIC: Range = Range { low: 50.0, high: 300.0 };
    pub const BP_DIASTOLIC: Range = Range { low: 30.0, high: 200.0 };
    pub const BP_HEART_RATE: Range = Range { low: 30.0, high: 220.0 };
    pub const TEMP_CELSIUS: Range = Range { low: 25.0, high: 50.0 };
    pub const TEMP_FAHRENHEIT: Range = Range { low: 77.0, high: 122.0 };
}

/// Validates decoded measurements against §4.6's plausibility bounds and
/// flags them against the configured normal ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub normal_ranges: NormalRanges,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            normal_ranges: NormalRanges::default(),
        }
    }
}

impl Validator {
    /// Validate and flag a blood-pressure measurement in place.
    pub fn validate_bp(&self, m: &mut BloodPressureMeasurement) {
        let mut valid = plausibility::BP_SYSTOLIC.contains(m.systolic_mmhg)
            && plausibility::BP_DIASTOLIC.contains(m.diastolic_mmhg)
            && m.systolic_mmhg > m.diastolic_mmhg;
        if let Some(hr) = m.heart_rate_bpm {
            valid &= plausibility::BP_HEART_RATE.contains(hr);
        }
        m.valid = valid;
        m.in_normal_range = if valid {
            let mut normal = self.normal_ranges.bp_systolic.contains(m.systolic_mmhg)
                && self.normal_ranges.bp_diastolic.contains(m.diastolic_mmhg);
            if let Some(hr) = m.heart_rate_bpm {
                normal &= self.normal_ranges.bp_heart_rate.contains(hr);
            }
            Some(normal)
        } else {
            None
        };
    }

    /// Validate and flag a temperature measurement in place.
    pub fn validate_temp(&self, m: &mut TemperatureMeasurement) {
        let bounds = match m.unit {
            TemperatureUnit::Celsius => plausibility::TEMP_CELSIUS,
            TemperatureUnit::Fahrenheit => plausibility::TEMP_FAHRENHEIT,
        };
        m.valid = bounds.contains(m.temperature);
        m.in_normal_range = if m.valid {
            let celsius = match m.unit {
                TemperatureUnit::Celsius => m.temperature,
                TemperatureUnit::Fahrenheit => (m.temperature - 32.0) * 5.0 / 9.0,
            };
            Some(self.normal_ranges.temp_celsius.contains(celsius))
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::DeviceHandle;
    use std::time::SystemTime;

    fn bp(systolic: f64, diastolic: f64, hr: Option<f64>) -> BloodPressureMeasurement {
        BloodPressureMeasurement {
            handle: DeviceHandle::new(1),
            systolic_mmhg: systolic,
            diastolic_mmhg: diastolic,
            heart_rate_bpm: hr,
            timestamp: SystemTime::now(),
            valid: false,
            in_normal_range: None,
        }
    }

    fn temp(value: f64, unit: TemperatureUnit) -> TemperatureMeasurement {
        TemperatureMeasurement {
            handle: DeviceHandle::new(1),
            temperature: value,
            unit,
            timestamp: SystemTime::now(),
            valid: false,
            in_normal_range: None,
        }
    }

    #[test]
    fn plausible_bp_is_valid() {
        let validator = Validator::default();
        let mut m = bp(120.0, 80.0, Some(72.0));
        validator.validate_bp(&mut m);
        assert!(m.valid);
        assert_eq!(m.in_normal_range, Some(true));
    }

    #[test]
    fn systolic_not_greater_than_diastolic_is_invalid() {
        let validator = Validator::default();
        let mut m = bp(80.0, 120.0, None);
        validator.validate_bp(&mut m);
        assert!(!m.valid);
        assert_eq!(m.in_normal_range, None);
    }

    #[test]
    fn out_of_plausible_range_bp_is_invalid() {
        let validator = Validator::default();
        let mut m = bp(400.0, 80.0, None);
        validator.validate_bp(&mut m);
        assert!(!m.valid);
    }

    #[test]
    fn plausible_but_out_of_normal_range_temp_is_valid_but_flagged() {
        let validator = Validator::default();
        let mut m = temp(33.6, TemperatureUnit::Celsius);
        validator.validate_temp(&mut m);
        assert!(m.valid);
        assert_eq!(m.in_normal_range, Some(false));
    }

    #[test]
    fn fahrenheit_uses_its_own_plausibility_band() {
        let validator = Validator::default();
        let mut m = temp(98.6, TemperatureUnit::Fahrenheit);
        validator.validate_temp(&mut m);
        assert!(m.valid);
    }

    #[test]
    fn implausible_temp_is_invalid() {
        let validator = Validator::default();
        let mut m = temp(10.0, TemperatureUnit::Celsius);
        validator.validate_temp(&mut m);
        assert!(!m.valid);
    }
}
