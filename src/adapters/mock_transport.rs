//! In-memory `BleTransport` for tests and demos, simulating a blood-pressure
//! cuff and a thermometer without hardware.

use crate::domain::device::DeviceHandle;
use crate::ports::ble_transport::{
    AdvertisementStream, Advertisement, BleTransport, CccdValue, Characteristic, DeviceSession,
    LinkStatus, LinkStatusStream, PairingOutcome, RawFrameStream, Service, StatusCode,
    TransportError, TransportResult,
};
use async_trait::async_trait;
use btleplug::api::bleuuid::uuid_from_u16;
use btleplug::api::CharPropFlags;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

const BP_SERVICE: u16 = 0x1810;
const BP_MEASUREMENT: u16 = 0x2A35;
const THERMOMETER_SERVICE: u16 = 0x1809;
const TEMP_MEASUREMENT: u16 = 0x2A1C;

/// One simulated peripheral.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub handle: DeviceHandle,
    pub local_name: String,
    pub service: Uuid,
    pub rssi: i16,
}

/// Flags byte, then systolic/diastolic/heart-rate as SFLOATs with exponent 0
/// (mantissa == the mmHg value): 120/80 mmHg at 72 bpm.
fn bp_frame() -> Vec<u8> {
    vec![0x00, 0x78, 0x00, 0x50, 0x00, 0x48, 0x00]
}

fn temp_frame() -> Vec<u8> {
    vec![0x00, 0x68, 0x01, 0x00, 0xFF]
}

/// Simulated transport advertising a fixed roster of devices and emitting
/// synthetic measurement frames at a configurable rate once subscribed.
pub struct MockTransport {
    devices: Vec<MockDevice>,
    connected: DashMap<u64, Arc<AtomicBool>>,
    frame_period: Duration,
}

impl MockTransport {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            connected: DashMap::new(),
            frame_period: Duration::from_secs(1),
        }
    }

    /// Two devices: one blood-pressure monitor, one thermometer.
    pub fn with_default_roster() -> Self {
        Self::new(vec![
            MockDevice {
                handle: DeviceHandle::new(1),
                local_name: "Mock BP Monitor".into(),
                service: uuid_from_u16(BP_SERVICE),
                rssi: -60,
            },
            MockDevice {
                handle: DeviceHandle::new(2),
                local_name: "Mock Thermometer".into(),
                service: uuid_from_u16(THERMOMETER_SERVICE),
                rssi: -55,
            },
        ])
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn start_scan(&self, _service_uuids: &[Uuid]) -> TransportResult<AdvertisementStream> {
        let (tx, rx) = mpsc::channel(self.devices.len().max(1));
        for device in self.devices.clone() {
            let _ = tx
                .send(Advertisement {
                    handle: device.handle,
                    local_name: Some(device.local_name),
                    service_uuids: vec![device.service],
                    rssi: device.rssi,
                })
                .await;
        }
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn stop_scan(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn open_device(&self, handle: DeviceHandle) -> TransportResult<Box<dyn DeviceSession>> {
        let device = self
            .devices
            .iter()
            .find(|d| d.handle == handle)
            .cloned()
            .ok_or(TransportError(StatusCode::Unreachable))?;
        let flag = Arc::new(AtomicBool::new(true));
        self.connected.insert(handle.raw(), Arc::clone(&flag));
        Ok(Box::new(MockSession {
            device,
            connected: flag,
            frame_period: self.frame_period,
        }))
    }
}

struct MockSession {
    device: MockDevice,
    connected: Arc<AtomicBool>,
    frame_period: Duration,
}

impl MockSession {
    fn is_thermometer(&self) -> bool {
        self.device.service == uuid_from_u16(THERMOMETER_SERVICE)
    }

    fn measurement_characteristic(&self) -> Characteristic {
        let (service, characteristic) = if self.is_thermometer() {
            (THERMOMETER_SERVICE, TEMP_MEASUREMENT)
        } else {
            (BP_SERVICE, BP_MEASUREMENT)
        };
        Characteristic {
            uuid: uuid_from_u16(characteristic),
            service_uuid: uuid_from_u16(service),
            properties: CharPropFlags::NOTIFY | CharPropFlags::INDICATE,
        }
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    async fn services(&self) -> TransportResult<Vec<Service>> {
        let characteristic = self.measurement_characteristic();
        Ok(vec![Service {
            uuid: characteristic.service_uuid,
            characteristics: vec![characteristic],
        }])
    }

    async fn pair(&self) -> TransportResult<PairingOutcome> {
        Ok(PairingOutcome::AlreadyPaired)
    }

    async fn connection_status_changes(&self) -> TransportResult<LinkStatusStream> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn read_cccd(&self, _characteristic: &Characteristic) -> TransportResult<CccdValue> {
        Ok(CccdValue::None)
    }

    async fn write_cccd(&self, _characteristic: &Characteristic, _value: CccdValue) -> TransportResult<()> {
        Ok(())
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> TransportResult<RawFrameStream> {
        let (tx, rx) = mpsc::channel(16);
        let connected = Arc::clone(&self.connected);
        let is_thermometer = characteristic.uuid == uuid_from_u16(TEMP_MEASUREMENT);
        let period = self.frame_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if !connected.load(Ordering::SeqCst) {
                    break;
                }
                let frame = if is_thermometer { temp_frame() } else { bp_frame() };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn scan_emits_the_configured_roster() {
        let transport = MockTransport::with_default_roster();
        let mut stream = transport.start_scan(&[]).await.unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.handle, DeviceHandle::new(1));
    }

    #[tokio::test]
    async fn open_unknown_handle_fails() {
        let transport = MockTransport::with_default_roster();
        let err = transport.open_device(DeviceHandle::new(999)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::Unreachable);
    }

    #[tokio::test]
    async fn subscribing_to_the_bp_device_yields_bp_frames() {
        let transport = MockTransport::with_default_roster();
        let session = transport.open_device(DeviceHandle::new(1)).await.unwrap();
        let services = session.services().await.unwrap();
        let characteristic = services[0].characteristics[0].clone();
        let mut frames = session.subscribe(&characteristic).await.unwrap();
        let frame = frames.next().await.unwrap();
        assert_eq!(frame, bp_frame());
    }
}
