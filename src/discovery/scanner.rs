//! Continuous advertisement scanning with classification and de-duplication
//! (§4.1).

use crate::discovery::classifier::classify;
use crate::domain::device::{Candidate, DeviceHandle};
use crate::ports::ble_transport::{Advertisement, BleTransport, TransportResult};
use crate::ports::event_sink::{DiscoveryEvent, EngineStatus, EventSink};
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEDUP_WINDOW: Duration = Duration::from_secs(2);
const DEDUP_RSSI_DELTA: i16 = 8;
const RESTART_BACKOFF: Duration = Duration::from_secs(2);

struct DedupState {
    last_emitted: Instant,
    last_rssi: i16,
}

/// Continuously consumes advertisements from a `BleTransport`, classifies
/// and de-duplicates them, and forwards classified candidates downstream
/// while reporting `DiscoveryEvent`s to the sink.
pub struct Scanner {
    transport: Arc<dyn BleTransport>,
    sink: Arc<dyn EventSink>,
    dedup: DashMap<u64, DedupState>,
    suppressed_until: DashMap<u64, Instant>,
    scan_restart_max: u8,
    scanning: AtomicBool,
}

impl Scanner {
    pub fn new(transport: Arc<dyn BleTransport>, sink: Arc<dyn EventSink>, scan_restart_max: u8) -> Self {
        Self {
            transport,
            sink,
            dedup: DashMap::new(),
            suppressed_until: DashMap::new(),
            scan_restart_max,
            scanning: AtomicBool::new(false),
        }
    }

    /// Suppress re-emission of a candidate for `duration` after a pairing
    /// failure (§7).
    pub fn suppress(&self, handle: DeviceHandle, duration: Duration) {
        self.suppressed_until.insert(handle.raw(), Instant::now() + duration);
    }

    fn is_suppressed(&self, handle: DeviceHandle) -> bool {
        match self.suppressed_until.get(&handle.raw()) {
            Some(until) => Instant::now() < *until,
            None => false,
        }
    }

    fn should_emit(&self, handle: DeviceHandle, rssi: i16) -> bool {
        let now = Instant::now();
        if let Some(mut state) = self.dedup.get_mut(&handle.raw()) {
            let age = now.saturating_duration_since(state.last_emitted);
            let delta = (rssi - state.last_rssi).abs();
            if age < DEDUP_WINDOW && delta < DEDUP_RSSI_DELTA {
                return false;
            }
            state.last_emitted = now;
            state.last_rssi = rssi;
            return true;
        }
        self.dedup.insert(handle.raw(), DedupState { last_emitted: now, last_rssi: rssi });
        true
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Idempotent stop: the scan loop observes this via `cancellation` in
    /// practice, but this flips the externally-observable flag too.
    pub async fn stop(&self) -> TransportResult<()> {
        self.scanning.store(false, Ordering::SeqCst);
        self.transport.stop_scan().await
    }

    /// Run the scan loop until cancelled, forwarding classified candidates
    /// on `out`. Handles scan-restart backoff and the fatal-after-5-restarts
    /// rule (§4.1 failure semantics).
    pub async fn run(&self, out: mpsc::Sender<Candidate>, cancellation: CancellationToken) {
        let mut restarts: u8 = 0;
        loop {
            if cancellation.is_cancelled() {
                return;
            }
            self.scanning.store(true, Ordering::SeqCst);
            match self.transport.start_scan(&[]).await {
                Ok(mut stream) => {
                    restarts = 0;
                    loop {
                        tokio::select! {
                            _ = cancellation.cancelled() => {
                                let _ = self.stop().await;
                                return;
                            }
                            item = stream.next() => match item {
                                Some(advertisement) => self.handle_advertisement(advertisement, &out).await,
                                None => break,
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "scan start failed");
                }
            }
            self.scanning.store(false, Ordering::SeqCst);
            self.sink.on_engine_status(EngineStatus::ScannerStopped).await;
            restarts += 1;
            if restarts > self.scan_restart_max {
                self.sink.on_engine_status(EngineStatus::Fatal).await;
                return;
            }
            self.sink.on_engine_status(EngineStatus::ScannerRestarting).await;
            tokio::select! {
                _ = tokio::time::sleep(RESTART_BACKOFF) => {}
                _ = cancellation.cancelled() => return,
            }
        }
    }

    async fn handle_advertisement(&self, advertisement: Advertisement, out: &mpsc::Sender<Candidate>) {
        if self.is_suppressed(advertisement.handle) {
            return;
        }
        let Some(kind) = classify(&advertisement.service_uuids, advertisement.local_name.as_deref()) else {
            return;
        };
        if !self.should_emit(advertisement.handle, advertisement.rssi) {
            return;
        }
        let candidate = Candidate {
            handle: advertisement.handle,
            kind,
            rssi: advertisement.rssi,
            local_name: advertisement.local_name.clone(),
        };
        self.sink
            .on_discovery(DiscoveryEvent {
                handle: candidate.handle,
                kind: candidate.kind,
                rssi: candidate.rssi,
            })
            .await;
        let _ = out.send(candidate).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ble_transport::{AdvertisementStream, DeviceSession, StatusCode, TransportError};
    use crate::ports::event_sink::{MeasurementEvent, StatusEvent};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct StubTransport;

    #[async_trait]
    impl BleTransport for StubTransport {
        async fn start_scan(&self, _service_uuids: &[Uuid]) -> TransportResult<AdvertisementStream> {
            Err(TransportError(StatusCode::Unreachable))
        }
        async fn stop_scan(&self) -> TransportResult<()> {
            Ok(())
        }
        async fn open_device(&self, _handle: DeviceHandle) -> TransportResult<Box<dyn DeviceSession>> {
            Err(TransportError(StatusCode::Unreachable))
        }
    }

    struct StubSink;

    #[async_trait]
    impl EventSink for StubSink {
        async fn on_measurement(&self, _event: MeasurementEvent) {}
        async fn on_status(&self, _event: StatusEvent) {}
        async fn on_discovery(&self, _event: DiscoveryEvent) {}
        async fn on_engine_status(&self, _status: EngineStatus) {}
        async fn on_decoder_dropped(&self, _handle: DeviceHandle, _reason: String) {}
    }

    fn scanner() -> Scanner {
        Scanner::new(Arc::new(StubTransport), Arc::new(StubSink), 5)
    }

    #[test]
    fn first_emission_for_a_handle_always_emits() {
        let s = scanner();
        assert!(s.should_emit(DeviceHandle::new(1), -60));
    }

    #[test]
    fn immediate_repeat_with_small_rssi_delta_is_suppressed() {
        let s = scanner();
        assert!(s.should_emit(DeviceHandle::new(1), -60));
        assert!(!s.should_emit(DeviceHandle::new(1), -62));
    }

    #[test]
    fn large_rssi_delta_re_emits_immediately() {
        let s = scanner();
        assert!(s.should_emit(DeviceHandle::new(1), -60));
        assert!(s.should_emit(DeviceHandle::new(1), -40));
    }

    #[test]
    fn suppressed_handle_is_reported_suppressed() {
        let s = scanner();
        let handle = DeviceHandle::new(1);
        assert!(!s.is_suppressed(handle));
        s.suppress(handle, Duration::from_secs(30));
        assert!(s.is_suppressed(handle));
    }
}
