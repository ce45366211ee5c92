//! Blood Pressure Measurement (`0x2A35`) decoding per §4.5 and IEEE
//! 11073-10407.

use crate::decode::DecodeError;
use crate::domain::device::DeviceHandle;
use crate::domain::ieee11073::sfloat_from_le_bytes;
use crate::domain::measurement::BloodPressureMeasurement;
use std::time::SystemTime;

const MIN_LEN: usize = 7;
const STANDARD_HR_LEN: usize = 15;

/// Decodes Blood Pressure Measurement frames. Byte 0 (flags) is consumed
/// but not interpreted by this decoder — see the Design Notes' open
/// question about the MAP-present bit, which this implementation
/// deliberately does not check.
#[derive(Debug, Default)]
pub struct BpDecoder;

impl BpDecoder {
    pub fn decode(&self, handle: DeviceHandle, frame: &[u8]) -> Result<BloodPressureMeasurement, DecodeError> {
        if frame.len() < MIN_LEN {
            return Err(DecodeError::InsufficientBytes {
                need: MIN_LEN,
                got: frame.len(),
            });
        }
        let systolic = sfloat_from_le_bytes([frame[1], frame[2]]);
        let diastolic = sfloat_from_le_bytes([frame[3], frame[4]]);
        let heart_rate = if frame.len() >= STANDARD_HR_LEN {
            Some(sfloat_from_le_bytes([frame[13], frame[14]]))
        } else if frame.len() >= MIN_LEN {
            // Observed firmware variant (§9 open question): some devices
            // pack heart rate at bytes 5-6 of a short frame instead of the
            // standard trailing position.
            Some(sfloat_from_le_bytes([frame[5], frame[6]]))
        } else {
            None
        };
        Ok(BloodPressureMeasurement {
            handle,
            systolic_mmhg: systolic,
            diastolic_mmhg: diastolic,
            heart_rate_bpm: heart_rate,
            timestamp: SystemTime::now(),
            valid: false,
            in_normal_range: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_frames_shorter_than_seven_bytes() {
        let decoder = BpDecoder::default();
        let err = decoder.decode(DeviceHandle::new(1), &[0u8; 6]).unwrap_err();
        assert_eq!(err, DecodeError::InsufficientBytes { need: 7, got: 6 });
    }

    #[test]
    fn seven_byte_frame_yields_variant_heart_rate() {
        // flags, systolic SFLOAT, diastolic SFLOAT, hr SFLOAT (variant path)
        let frame = [0x1E, 0x78, 0xF0, 0x50, 0xF0, 0x48, 0x00];
        let decoder = BpDecoder::default();
        let m = decoder.decode(DeviceHandle::new(1), &frame).unwrap();
        assert!(m.heart_rate_bpm.is_some());
    }

    #[test]
    fn fifteen_byte_frame_reads_heart_rate_from_standard_position() {
        let mut frame = vec![0u8; 15];
        frame[0] = 0x1E;
        frame[1..3].copy_from_slice(&[0x78, 0xF0]);
        frame[3..5].copy_from_slice(&[0x50, 0xF0]);
        frame[13..15].copy_from_slice(&[0x48, 0x00]);
        let decoder = BpDecoder::default();
        let m = decoder.decode(DeviceHandle::new(1), &frame).unwrap();
        assert!(m.heart_rate_bpm.is_some());
    }

    #[test]
    fn fifteen_byte_frame_decodes_each_field_via_sfloat() {
        let frame = [
            0x1E, 0x78, 0xF0, 0x50, 0xF0, 0x46, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x48,
            0xF0,
        ];
        let decoder = BpDecoder::default();
        let m = decoder.decode(DeviceHandle::new(1), &frame).unwrap();
        assert_eq!(m.systolic_mmhg, sfloat_from_le_bytes([frame[1], frame[2]]));
        assert_eq!(m.diastolic_mmhg, sfloat_from_le_bytes([frame[3], frame[4]]));
        assert_eq!(
            m.heart_rate_bpm,
            Some(sfloat_from_le_bytes([frame[13], frame[14]]))
        );
    }
}
