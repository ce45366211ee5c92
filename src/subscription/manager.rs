//! Resolves measurement characteristics after connect and enables
//! notify/indicate on each, routing value-changed frames downstream (§4.4).

use crate::domain::device::{DeviceHandle, DeviceKind};
use crate::domain::frame::RawFrame;
use crate::ports::ble_transport::{
    CccdValue, Characteristic, DeviceSession, RawFrameStream, Service, StatusCode,
    TransportError, TransportResult,
};
use btleplug::api::bleuuid::BleUuid;
use btleplug::api::CharPropFlags;
use dashmap::DashMap;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;

const SERVICE_FETCH_RETRIES: u32 = 3;
const SERVICE_FETCH_SPACING: Duration = Duration::from_secs(1);
const CCCD_WRITE_RETRIES: u32 = 3;
const CCCD_CLEAR_WAIT: Duration = Duration::from_millis(500);

fn target_characteristics(kind: DeviceKind) -> &'static [u16] {
    match kind {
        DeviceKind::BloodPressure => &[0x2A35],
        DeviceKind::Thermometer => &[0x2A1C, 0x2A1E, 0xFFF1, 0xFFF4],
    }
}

fn matches_target(characteristic: &Characteristic, targets: &[u16]) -> bool {
    characteristic
        .uuid
        .to_ble_u16()
        .map(|short| targets.contains(&short))
        .unwrap_or(false)
}

/// Prefer Indicate over Notify when both are supported — Indicate's ACK
/// avoids silent losses some firmware exhibits with bare Notify.
fn preferred_cccd(props: CharPropFlags) -> Option<CccdValue> {
    if props.contains(CharPropFlags::INDICATE) {
        Some(CccdValue::Indicate)
    } else if props.contains(CharPropFlags::NOTIFY) {
        Some(CccdValue::Notify)
    } else {
        None
    }
}

pub type FrameStream = Pin<Box<dyn Stream<Item = RawFrame> + Send>>;

/// Tracks per-handle subscription liveness (`lastFrameAt`, §3) and drives
/// the characteristic-enable algorithm of §4.4.
#[derive(Default)]
pub struct SubscriptionManager {
    last_frame_at: DashMap<u64, SystemTime>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame_at(&self, handle: DeviceHandle) -> Option<SystemTime> {
        self.last_frame_at.get(&handle.raw()).map(|v| *v)
    }

    /// Step 1 (and, since our transport's `Service` already bundles its
    /// characteristics, step 2) of the enable algorithm: fetch the device's
    /// GATT catalogue, retrying on failure.
    async fn fetch_services(&self, session: &dyn DeviceSession) -> TransportResult<Vec<Service>> {
        let mut last_err = TransportError(StatusCode::Unknown);
        for attempt in 0..SERVICE_FETCH_RETRIES {
            match session.services().await {
                Ok(services) => return Ok(services),
                Err(err) => {
                    tracing::warn!(attempt, error = ?err, "service fetch failed, retrying");
                    last_err = err;
                    sleep(SERVICE_FETCH_SPACING).await;
                }
            }
        }
        Err(last_err)
    }

    /// Step 3: read-before-write CCCD clear, then write with the chosen
    /// value, retrying with the per-status-code backoff.
    async fn enable_characteristic(
        &self,
        session: &dyn DeviceSession,
        characteristic: &Characteristic,
        value: CccdValue,
    ) -> TransportResult<()> {
        if let Ok(current) = session.read_cccd(characteristic).await {
            if current != CccdValue::None {
                let _ = session.write_cccd(characteristic, CccdValue::None).await;
                sleep(CCCD_CLEAR_WAIT).await;
            }
        }

        let mut last_err = TransportError(StatusCode::Unknown);
        for _ in 0..CCCD_WRITE_RETRIES {
            match session.write_cccd(characteristic, value).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let wait = match err.0 {
                        StatusCode::AccessDenied => Duration::from_secs(2),
                        StatusCode::Unreachable => Duration::from_secs(1),
                        _ => Duration::from_secs(1),
                    };
                    last_err = err;
                    sleep(wait).await;
                }
            }
        }
        Err(last_err)
    }

    /// Enables notify/indicate on every target characteristic for `kind`,
    /// falling back to every notify/indicate-capable characteristic when a
    /// thermometer advertises none of the standard UUIDs (§4.4 step 4).
    /// Takes `Arc<Self>` because the returned frame streams outlive this
    /// call and still need to touch `last_frame_at` on every emission.
    pub async fn subscribe(
        self: &Arc<Self>,
        handle: DeviceHandle,
        kind: DeviceKind,
        session: &dyn DeviceSession,
    ) -> TransportResult<Vec<(Characteristic, FrameStream)>> {
        let services = self.fetch_services(session).await?;
        let targets = target_characteristics(kind);

        let mut matched: Vec<Characteristic> = services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .filter(|c| matches_target(c, targets) && preferred_cccd(c.properties).is_some())
            .cloned()
            .collect();

        if matched.is_empty() && kind == DeviceKind::Thermometer {
            tracing::debug!(%handle, "no standard thermometer characteristic found, falling back to every notify/indicate characteristic");
            matched = services
                .iter()
                .flat_map(|s| s.characteristics.iter())
                .filter(|c| preferred_cccd(c.properties).is_some())
                .cloned()
                .collect();
        }

        let mut enabled = Vec::new();
        for characteristic in matched {
            let value = preferred_cccd(characteristic.properties).expect("filtered above");
            if let Err(err) = self
                .enable_characteristic(session, &characteristic, value)
                .await
            {
                tracing::warn!(%handle, characteristic = %characteristic.uuid, error = ?err, "failed to enable subscription");
                continue;
            }
            match session.subscribe(&characteristic).await {
                Ok(frames) => {
                    let routed = self.route(handle, characteristic.uuid, frames);
                    enabled.push((characteristic, routed));
                }
                Err(err) => {
                    tracing::warn!(%handle, characteristic = %characteristic.uuid, error = ?err, "subscribe call failed after enable");
                }
            }
        }
        Ok(enabled)
    }

    /// Wraps a raw byte stream into tagged `RawFrame`s, updating
    /// `lastFrameAt` atomically on every emission (§4.4 Routing).
    fn route(
        self: &Arc<Self>,
        handle: DeviceHandle,
        characteristic_uuid: uuid::Uuid,
        frames: RawFrameStream,
    ) -> FrameStream {
        let manager = Arc::clone(self);
        Box::pin(frames.map(move |bytes| {
            let now = SystemTime::now();
            manager.last_frame_at.insert(handle.raw(), now);
            RawFrame {
                handle,
                characteristic_uuid,
                bytes,
                arrived_at: now,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_cccd_chooses_indicate_over_notify() {
        let both = CharPropFlags::NOTIFY | CharPropFlags::INDICATE;
        assert_eq!(preferred_cccd(both), Some(CccdValue::Indicate));
    }

    #[test]
    fn preferred_cccd_falls_back_to_notify() {
        assert_eq!(preferred_cccd(CharPropFlags::NOTIFY), Some(CccdValue::Notify));
    }

    #[test]
    fn preferred_cccd_none_when_neither_supported() {
        assert_eq!(preferred_cccd(CharPropFlags::READ), None);
    }

    #[test]
    fn blood_pressure_targets_only_standard_measurement_characteristic() {
        assert_eq!(target_characteristics(DeviceKind::BloodPressure), &[0x2A35]);
    }

    #[test]
    fn thermometer_targets_include_vendor_fallback_uuids() {
        let targets = target_characteristics(DeviceKind::Thermometer);
        assert!(targets.contains(&0xFFF1));
        assert!(targets.contains(&0xFFF4));
    }

    #[test]
    fn last_frame_at_is_none_before_any_emission() {
        let manager = SubscriptionManager::new();
        assert!(manager.last_frame_at(DeviceHandle::new(1)).is_none());
    }
}
