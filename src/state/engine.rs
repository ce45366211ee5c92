//! Top-level orchestrator wiring Discovery through Decode/Validate to the
//! `EventSink` (§2), with an explicit linearizer state replacing the
//! source's re-entrant global start/stop mutex (§9, REDESIGN FLAGS).

use crate::discovery::{Pairer, Scanner};
use crate::domain::device::Candidate;
use crate::domain::reconnection::ReconnectionPolicy;
use crate::domain::validation::{NormalRanges, Validator};
use crate::health_probe::SWEEP_INTERVAL;
use crate::ports::ble_transport::BleTransport;
use crate::ports::event_sink::EventSink;
use crate::state::slot_table::{SlotCommand, SlotTable};
use crate::subscription::SubscriptionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(2);
const PAIR_SUPPRESSION: Duration = Duration::from_secs(30);

/// The single recognized-options struct (§6 Configuration table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts before `ScannerStopped` is escalated to `Fatal`.
    pub scan_restart_max: u8,
    /// Connect deadline in milliseconds.
    pub connect_timeout_ms: u64,
    /// Ordered reconnection backoff schedule, in milliseconds.
    pub reconnect_backoff_ms: Vec<u64>,
    /// Enables the §4.3 smart auto-disconnect policy. Off by default.
    pub smart_disconnect: bool,
    /// Silence duration, in milliseconds, before a connected slot is probed.
    pub idle_probe_threshold_ms: u64,
    /// Global concurrent-connect semaphore limit.
    pub concurrent_connects: usize,
    /// Validator plausibility/normal-range thresholds.
    pub normal_ranges: NormalRanges,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_restart_max: 5,
            connect_timeout_ms: 30_000,
            reconnect_backoff_ms: vec![1000, 2000, 4000],
            smart_disconnect: false,
            idle_probe_threshold_ms: 30_000,
            concurrent_connects: 5,
            normal_ranges: NormalRanges::default(),
        }
    }
}

/// Explicit engine-wide linearizer state, replacing the source's re-entrant
/// global mutex workaround around start/stop (§9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLifecycle {
    Idle,
    Starting,
    Running,
    Stopping,
}

struct EngineInner {
    lifecycle: Mutex<EngineLifecycle>,
    transport: Arc<dyn BleTransport>,
    sink: Arc<dyn EventSink>,
    scanner: Arc<Scanner>,
    pairer: Pairer,
    slots: SlotTable,
    subscriptions: Arc<SubscriptionManager>,
    /// Rebuilt on every `start()`: a `CancellationToken` is single-shot, and
    /// this engine instance may be started and stopped more than once.
    cancellation: Mutex<CancellationToken>,
}

/// The ingestion engine: owns Discovery & Pairing, Connection Lifecycle,
/// GATT Subscription, and Decode/Validate, delivering everything to one
/// `EventSink`.
pub struct Engine {
    inner: Arc<EngineInner>,
    /// Single-permit semaphore serializing start/stop transitions (§5).
    lifecycle_lock: Arc<Semaphore>,
}

impl Engine {
    pub fn new(transport: Arc<dyn BleTransport>, sink: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&transport),
            Arc::clone(&sink),
            config.scan_restart_max,
        ));
        let pairer = Pairer::new(Arc::clone(&transport));
        let reconnect_policy = ReconnectionPolicy {
            backoff_ms: config.reconnect_backoff_ms.clone(),
        };
        let validator = Arc::new(Validator {
            normal_ranges: config.normal_ranges.clone(),
        });
        let slots = SlotTable::new(
            config.concurrent_connects,
            Duration::from_millis(config.connect_timeout_ms),
            reconnect_policy,
            validator,
            config.smart_disconnect,
            Duration::from_millis(config.idle_probe_threshold_ms),
        );
        let inner = Arc::new(EngineInner {
            lifecycle: Mutex::new(EngineLifecycle::Idle),
            transport,
            sink,
            scanner,
            pairer,
            slots,
            subscriptions: Arc::new(SubscriptionManager::new()),
            cancellation: Mutex::new(CancellationToken::new()),
        });
        Self {
            inner,
            lifecycle_lock: Arc::new(Semaphore::new(1)),
        }
    }

    pub async fn lifecycle(&self) -> EngineLifecycle {
        *self.inner.lifecycle.lock().await
    }

    /// Starts scanning, candidate routing, and the health-probe sweep.
    /// A no-op if the engine isn't `Idle`.
    pub async fn start(&self) {
        let _permit = self.lifecycle_lock.acquire().await;
        {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            if *lifecycle != EngineLifecycle::Idle {
                return;
            }
            *lifecycle = EngineLifecycle::Starting;
        }

        let token = CancellationToken::new();
        *self.inner.cancellation.lock().await = token.clone();

        let (candidates_tx, candidates_rx) = mpsc::channel(64);
        let inner = Arc::clone(&self.inner);

        tokio::spawn({
            let inner = Arc::clone(&inner);
            let token = token.clone();
            async move {
                inner.scanner.run(candidates_tx, token).await;
            }
        });
        tokio::spawn(Self::route_candidates(Arc::clone(&inner), candidates_rx));
        tokio::spawn(Self::health_sweep(Arc::clone(&inner), token));

        *self.inner.lifecycle.lock().await = EngineLifecycle::Running;
    }

    /// Pairs, connects, and subscribes each classified candidate as it
    /// arrives from the scanner (§2 pipeline, §4.1 Pairer detail).
    async fn route_candidates(inner: Arc<EngineInner>, mut candidates: mpsc::Receiver<Candidate>) {
        while let Some(candidate) = candidates.recv().await {
            let Candidate { handle, kind, .. } = candidate;
            match inner.pairer.ensure_paired(handle).await {
                Ok(_session) => {
                    inner.slots.ensure_slot(
                        handle,
                        kind,
                        Arc::clone(&inner.transport),
                        Arc::clone(&inner.sink),
                        Arc::clone(&inner.subscriptions),
                    );
                    inner.slots.send(handle, SlotCommand::Connect).await;
                }
                Err(err) => {
                    tracing::warn!(%handle, error = ?err, "pairing failed, ignoring candidate for 30s");
                    inner.scanner.suppress(handle, PAIR_SUPPRESSION);
                }
            }
        }
    }

    /// Every `SWEEP_INTERVAL`, nudges every known slot to check its own
    /// liveness and probe if silent (§4.3). The probe itself runs inside
    /// each slot's actor so it stays totally ordered with that slot's other
    /// state transitions.
    async fn health_sweep(inner: Arc<EngineInner>, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = ticker.tick() => {
                    for handle in inner.slots.handles() {
                        inner.slots.send(handle, SlotCommand::HealthCheck).await;
                    }
                }
            }
        }
    }

    /// Stops scanning and disconnects every slot, awaiting completion with
    /// a 2 s global deadline before forcing resource release (§5).
    pub async fn stop(&self) {
        let _permit = self.lifecycle_lock.acquire().await;
        {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            if *lifecycle != EngineLifecycle::Running {
                return;
            }
            *lifecycle = EngineLifecycle::Stopping;
        }

        let _ = self.inner.scanner.stop().await;
        for handle in self.inner.slots.handles() {
            self.inner.slots.send(handle, SlotCommand::Disconnect).await;
        }
        self.inner.cancellation.lock().await.cancel();
        self.inner.slots.shutdown_all(SHUTDOWN_DEADLINE).await;

        *self.inner.lifecycle.lock().await = EngineLifecycle::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.scan_restart_max, 5);
        assert_eq!(config.connect_timeout_ms, 30_000);
        assert_eq!(config.reconnect_backoff_ms, vec![1000, 2000, 4000]);
        assert!(!config.smart_disconnect);
        assert_eq!(config.idle_probe_threshold_ms, 30_000);
        assert_eq!(config.concurrent_connects, 5);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.scan_restart_max, back.scan_restart_max);
        assert_eq!(config.reconnect_backoff_ms, back.reconnect_backoff_ms);
    }

    #[tokio::test]
    async fn lifecycle_reports_idle_before_start_and_after_stop() {
        use crate::adapters::MockTransport;
        use crate::domain::device::DeviceHandle;
        use crate::ports::event_sink::{DiscoveryEvent, EngineStatus, MeasurementEvent, StatusEvent};

        struct NullSink;
        #[async_trait::async_trait]
        impl EventSink for NullSink {
            async fn on_measurement(&self, _event: MeasurementEvent) {}
            async fn on_status(&self, _event: StatusEvent) {}
            async fn on_discovery(&self, _event: DiscoveryEvent) {}
            async fn on_engine_status(&self, _status: EngineStatus) {}
            async fn on_decoder_dropped(&self, _handle: DeviceHandle, _reason: String) {}
        }

        let engine = Engine::new(Arc::new(MockTransport::with_default_roster()), Arc::new(NullSink), EngineConfig::default());
        assert_eq!(engine.lifecycle().await, EngineLifecycle::Idle);
        engine.start().await;
        assert_eq!(engine.lifecycle().await, EngineLifecycle::Running);
        engine.stop().await;
        assert_eq!(engine.lifecycle().await, EngineLifecycle::Idle);
        // A second cycle must not hang on a stale cancellation token.
        engine.start().await;
        assert_eq!(engine.lifecycle().await, EngineLifecycle::Running);
        engine.stop().await;
        assert_eq!(engine.lifecycle().await, EngineLifecycle::Idle);
    }
}
