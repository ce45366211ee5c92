//! `tracing`-backed `EventSink`: structured log lines instead of colored
//! terminal output, suited to a long-running service rather than a
//! foreground CLI session.

use crate::domain::device::{DeviceHandle, DeviceKind};
use crate::domain::measurement::Measurement;
use crate::ports::event_sink::{
    ConnectionStatusKind, DiscoveryEvent, EngineStatus, EventSink, MeasurementEvent, StatusEvent,
};
use async_trait::async_trait;

/// Delivers every engine event as a structured `tracing` record at a level
/// matching its severity: measurements and discoveries at `info`, status
/// transitions at `info`/`warn` depending on outcome, and engine-wide
/// failures at `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn kind_label(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::BloodPressure => "blood_pressure",
        DeviceKind::Thermometer => "thermometer",
    }
}

#[async_trait]
impl EventSink for TracingEventSink {
    async fn on_measurement(&self, event: MeasurementEvent) {
        match event.payload {
            Measurement::BloodPressure(m) => {
                tracing::info!(
                    handle = %event.handle,
                    kind = kind_label(event.kind),
                    valid = event.valid,
                    systolic = m.systolic_mmhg,
                    diastolic = m.diastolic_mmhg,
                    heart_rate = ?m.heart_rate_bpm,
                    in_normal_range = ?m.in_normal_range,
                    "blood pressure measurement"
                );
            }
            Measurement::Temperature(m) => {
                tracing::info!(
                    handle = %event.handle,
                    kind = kind_label(event.kind),
                    valid = event.valid,
                    temperature = m.temperature,
                    unit = ?m.unit,
                    in_normal_range = ?m.in_normal_range,
                    "temperature measurement"
                );
            }
        }
    }

    async fn on_status(&self, event: StatusEvent) {
        match event.status {
            ConnectionStatusKind::Failed => {
                tracing::warn!(handle = %event.handle, error = ?event.error, "connection failed");
            }
            status => {
                tracing::info!(handle = %event.handle, ?status, "connection status changed");
            }
        }
    }

    async fn on_discovery(&self, event: DiscoveryEvent) {
        tracing::info!(
            handle = %event.handle,
            kind = kind_label(event.kind),
            rssi = event.rssi,
            "device discovered"
        );
    }

    async fn on_engine_status(&self, status: EngineStatus) {
        match status {
            EngineStatus::Fatal => tracing::error!("engine reached a fatal state"),
            EngineStatus::ScannerStopped => tracing::warn!("scanner stopped"),
            EngineStatus::ScannerRestarting => tracing::info!("scanner restarting"),
        }
    }

    async fn on_decoder_dropped(&self, handle: DeviceHandle, reason: String) {
        tracing::warn!(%handle, reason, "frame dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::DeviceHandle;
    use crate::domain::measurement::{BloodPressureMeasurement, TemperatureUnit};
    use std::time::SystemTime;

    #[tokio::test]
    async fn on_measurement_does_not_panic_for_either_variant() {
        let sink = TracingEventSink::new();
        sink.on_measurement(MeasurementEvent {
            handle: DeviceHandle::new(1),
            kind: DeviceKind::BloodPressure,
            valid: true,
            payload: Measurement::BloodPressure(BloodPressureMeasurement {
                handle: DeviceHandle::new(1),
                systolic_mmhg: 120.0,
                diastolic_mmhg: 80.0,
                heart_rate_bpm: Some(72.0),
                timestamp: SystemTime::now(),
                valid: true,
                in_normal_range: Some(true),
            }),
        })
        .await;
        assert_eq!(kind_label(DeviceKind::Thermometer), "thermometer");
        let _ = TemperatureUnit::Celsius;
    }

    #[tokio::test]
    async fn on_engine_status_handles_every_variant() {
        let sink = TracingEventSink::new();
        sink.on_engine_status(EngineStatus::ScannerStopped).await;
        sink.on_engine_status(EngineStatus::ScannerRestarting).await;
        sink.on_engine_status(EngineStatus::Fatal).await;
    }
}
