//! Dispatches a raw frame to the decoder matching its originating
//! characteristic UUID (§4.5).

use btleplug::api::bleuuid::{uuid_from_u16, BleUuid};
use uuid::Uuid;

const BP_MEASUREMENT: u16 = 0x2A35;
const TEMP_MEASUREMENT: u16 = 0x2A1C;
const INTERMEDIATE_TEMP: u16 = 0x2A1E;
const VENDOR_TEMP_1: u16 = 0xFFF1;
const VENDOR_TEMP_2: u16 = 0xFFF4;

/// Which decoder a characteristic's frames should be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    BloodPressure,
    Temperature,
}

/// Look up the route for a characteristic UUID. Returns `None` for
/// anything not in the demultiplexing table — callers should log and drop.
pub fn route_for(characteristic_uuid: &Uuid) -> Option<Route> {
    let short = characteristic_uuid.to_ble_u16()?;
    match short {
        BP_MEASUREMENT => Some(Route::BloodPressure),
        TEMP_MEASUREMENT | INTERMEDIATE_TEMP | VENDOR_TEMP_1 | VENDOR_TEMP_2 => {
            Some(Route::Temperature)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_pressure_characteristic_routes_correctly() {
        assert_eq!(route_for(&uuid_from_u16(BP_MEASUREMENT)), Some(Route::BloodPressure));
    }

    #[test]
    fn standard_and_vendor_temperature_characteristics_all_route_to_temperature() {
        for short in [TEMP_MEASUREMENT, INTERMEDIATE_TEMP, VENDOR_TEMP_1, VENDOR_TEMP_2] {
            assert_eq!(route_for(&uuid_from_u16(short)), Some(Route::Temperature));
        }
    }

    #[test]
    fn unrecognized_characteristic_has_no_route() {
        assert_eq!(route_for(&uuid_from_u16(0x2A37)), None);
    }
}
