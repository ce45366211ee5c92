//! Integration test for the full ingestion pipeline: mock transport through
//! discovery, pairing, connect, subscribe, decode, and validate, to a
//! collecting `EventSink`.

use async_trait::async_trait;
use phd_ingest::adapters::MockTransport;
use phd_ingest::domain::device::{DeviceHandle, DeviceKind};
use phd_ingest::domain::measurement::Measurement;
use phd_ingest::ports::event_sink::{
    ConnectionStatusKind, DiscoveryEvent, EngineStatus, EventSink, MeasurementEvent, StatusEvent,
};
use phd_ingest::state::{Engine, EngineConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// An `EventSink` that forwards every measurement and status event onto
/// channels a test can drain, so assertions run outside the engine's
/// internal tasks.
struct CollectingSink {
    measurements: mpsc::Sender<MeasurementEvent>,
    statuses: mpsc::Sender<StatusEvent>,
    discoveries: mpsc::Sender<DiscoveryEvent>,
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn on_measurement(&self, event: MeasurementEvent) {
        let _ = self.measurements.send(event).await;
    }

    async fn on_status(&self, event: StatusEvent) {
        let _ = self.statuses.send(event).await;
    }

    async fn on_discovery(&self, event: DiscoveryEvent) {
        let _ = self.discoveries.send(event).await;
    }

    async fn on_engine_status(&self, _status: EngineStatus) {}

    async fn on_decoder_dropped(&self, _handle: DeviceHandle, _reason: String) {}
}

/// Scan -> classify -> pair -> connect -> subscribe -> decode -> validate,
/// against the mock roster's blood-pressure monitor, end to end.
#[tokio::test]
async fn discovers_connects_and_decodes_the_mock_bp_monitor() {
    let transport = Arc::new(MockTransport::with_default_roster());
    let (measurements_tx, mut measurements_rx) = mpsc::channel(32);
    let (statuses_tx, mut statuses_rx) = mpsc::channel(32);
    let (discoveries_tx, _discoveries_rx) = mpsc::channel(32);
    let sink = Arc::new(CollectingSink {
        measurements: measurements_tx,
        statuses: statuses_tx,
        discoveries: discoveries_tx,
    });

    let engine = Engine::new(transport, sink, EngineConfig::default());
    engine.start().await;

    // Wait for the blood-pressure monitor to reach `Connected`.
    let bp_handle = DeviceHandle::new(1);
    let mut saw_connected = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        match timeout(Duration::from_secs(5), statuses_rx.recv()).await {
            Ok(Some(event)) if event.handle == bp_handle && event.status == ConnectionStatusKind::Connected => {
                saw_connected = true;
                break;
            }
            Ok(Some(_)) => continue,
            _ => break,
        }
    }
    assert!(saw_connected, "blood pressure monitor should reach Connected");

    // The next measurement event should be a valid, in-range reading.
    let event = timeout(Duration::from_secs(5), measurements_rx.recv())
        .await
        .expect("should receive a measurement before timeout")
        .expect("channel should not be closed");
    assert_eq!(event.handle, bp_handle);
    assert_eq!(event.kind, DeviceKind::BloodPressure);
    assert!(event.valid, "mock BP frame should decode to a plausible reading");
    match event.payload {
        Measurement::BloodPressure(m) => {
            assert_eq!(m.systolic_mmhg, 120.0);
            assert_eq!(m.diastolic_mmhg, 80.0);
            assert_eq!(m.heart_rate_bpm, Some(72.0));
            assert_eq!(m.in_normal_range, Some(true));
        }
        other => panic!("expected a blood pressure measurement, got {other:?}"),
    }

    engine.stop().await;
}

/// The thermometer in the mock roster should independently decode through
/// the IEEE 11073 FLOAT strategy to a plausible, in-range Celsius reading.
#[tokio::test]
async fn discovers_connects_and_decodes_the_mock_thermometer() {
    let transport = Arc::new(MockTransport::with_default_roster());
    let (measurements_tx, mut measurements_rx) = mpsc::channel(32);
    let (statuses_tx, _statuses_rx) = mpsc::channel(32);
    let (discoveries_tx, _discoveries_rx) = mpsc::channel(32);
    let sink = Arc::new(CollectingSink {
        measurements: measurements_tx,
        statuses: statuses_tx,
        discoveries: discoveries_tx,
    });

    let engine = Engine::new(transport, sink, EngineConfig::default());
    engine.start().await;

    let thermometer_handle = DeviceHandle::new(2);
    let mut received = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(8);
    while tokio::time::Instant::now() < deadline {
        match timeout(Duration::from_secs(8), measurements_rx.recv()).await {
            Ok(Some(event)) if event.handle == thermometer_handle => {
                received = Some(event);
                break;
            }
            Ok(Some(_)) => continue,
            _ => break,
        }
    }
    let event = received.expect("should receive a thermometer measurement before timeout");
    assert!(event.valid);
    match event.payload {
        Measurement::Temperature(m) => {
            assert_eq!(m.temperature, 36.0);
            assert_eq!(m.in_normal_range, Some(true));
        }
        other => panic!("expected a temperature measurement, got {other:?}"),
    }

    engine.stop().await;
}

/// Starting and stopping the engine twice in a row must not hang or panic —
/// the lifecycle guard should make the second `start`/`stop` pair a
/// straightforward repeat of the first.
#[tokio::test]
async fn engine_can_be_started_and_stopped_repeatedly() {
    let transport = Arc::new(MockTransport::with_default_roster());
    let (measurements_tx, _rx) = mpsc::channel(32);
    let (statuses_tx, _rx2) = mpsc::channel(32);
    let (discoveries_tx, _rx3) = mpsc::channel(32);
    let sink = Arc::new(CollectingSink {
        measurements: measurements_tx,
        statuses: statuses_tx,
        discoveries: discoveries_tx,
    });

    let engine = Engine::new(transport, sink, EngineConfig::default());
    engine.start().await;
    engine.stop().await;
    engine.start().await;
    engine.stop().await;
}
