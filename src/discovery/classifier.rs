//! Advertisement classification (§4.1).
//!
//! Rules are evaluated in order; the first match wins. Service UUIDs take
//! priority over the local-name heuristic, since they're the spec-backed
//! signal.

use crate::domain::device::DeviceKind;
use btleplug::api::bleuuid::{uuid_from_u16, BleUuid};
use uuid::Uuid;

const BLOOD_PRESSURE_SERVICE: u16 = 0x1810;
const HEALTH_THERMOMETER_SERVICE: u16 = 0x1809;

const BP_NAME_KEYWORDS: [&str; 3] = ["blood", "pressure", "bp"];
const THERM_NAME_KEYWORDS: [&str; 2] = ["therm", "temp"];

/// Classify an advertisement by its service UUID set and local name,
/// returning `None` when the advertisement should be dropped (rule 5).
pub fn classify(service_uuids: &[Uuid], local_name: Option<&str>) -> Option<DeviceKind> {
    if contains_service(service_uuids, BLOOD_PRESSURE_SERVICE) {
        return Some(DeviceKind::BloodPressure);
    }
    if contains_service(service_uuids, HEALTH_THERMOMETER_SERVICE) {
        return Some(DeviceKind::Thermometer);
    }
    if let Some(name) = local_name {
        let folded = name.to_lowercase();
        if BP_NAME_KEYWORDS.iter().any(|kw| folded.contains(kw)) {
            return Some(DeviceKind::BloodPressure);
        }
        if THERM_NAME_KEYWORDS.iter().any(|kw| folded.contains(kw)) {
            return Some(DeviceKind::Thermometer);
        }
    }
    None
}

fn contains_service(service_uuids: &[Uuid], short: u16) -> bool {
    let target = uuid_from_u16(short);
    service_uuids
        .iter()
        .any(|u| *u == target || u.to_ble_u16() == Some(short))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_pressure_service_uuid_wins() {
        let uuids = vec![uuid_from_u16(BLOOD_PRESSURE_SERVICE)];
        assert_eq!(classify(&uuids, None), Some(DeviceKind::BloodPressure));
    }

    #[test]
    fn thermometer_service_uuid_matches() {
        let uuids = vec![uuid_from_u16(HEALTH_THERMOMETER_SERVICE)];
        assert_eq!(classify(&uuids, None), Some(DeviceKind::Thermometer));
    }

    #[test]
    fn service_uuid_takes_priority_over_name() {
        let uuids = vec![uuid_from_u16(BLOOD_PRESSURE_SERVICE)];
        assert_eq!(
            classify(&uuids, Some("MyThermometer")),
            Some(DeviceKind::BloodPressure)
        );
    }

    #[test]
    fn name_heuristic_matches_blood_pressure() {
        assert_eq!(
            classify(&[], Some("BP Monitor 2000")),
            Some(DeviceKind::BloodPressure)
        );
    }

    #[test]
    fn name_heuristic_is_case_folded() {
        assert_eq!(
            classify(&[], Some("SMART THERM-X")),
            Some(DeviceKind::Thermometer)
        );
    }

    #[test]
    fn unmatched_advertisement_is_dropped() {
        assert_eq!(classify(&[], Some("Random Fitness Band")), None);
    }
}
