//! Per-device connection slots, each driven by its own actor task.
//!
//! Replaces a shared mutex over all connection state with one task per
//! `DeviceHandle`, each owning its `Connector` state machine and
//! subscription set and communicating only via an `mpsc` command channel —
//! so all state transitions and measurement deliveries for a single handle
//! are totally ordered (§5) without a lock any caller could contend on.

use crate::decode::{BpDecoder, DecodeError, TempDecoder};
use crate::demux::{self, Route};
use crate::domain::device::{DeviceHandle, DeviceKind};
use crate::domain::measurement::Measurement;
use crate::domain::reconnection::{ConnectionStatus, ReconnectionPolicy};
use crate::domain::validation::Validator;
use crate::health_probe::{self, ProbeOutcome, SmartDisconnectPolicy};
use crate::ports::ble_transport::{BleTransport, CccdValue, Characteristic, DeviceSession};
use crate::ports::event_sink::{ConnectionStatusKind, EventSink, MeasurementEvent, StatusEvent};
use crate::subscription::SubscriptionManager;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::connection::{ConnectionEvent, Connector};

/// Commands a `SlotActor` accepts on its command channel.
pub enum SlotCommand {
    /// Begin (or no-op if already connected) a connection attempt.
    Connect,
    /// The transport signaled the live connection was lost.
    ConnectionLost,
    /// Internal: fire the next scheduled reconnection attempt.
    ReconnectTick { attempt: u8 },
    /// The periodic sweep found this slot silent past the idle threshold;
    /// probe it and disconnect+reconnect if unhealthy (§4.3).
    HealthCheck,
    /// Internal: a valid measurement was delivered; arm the smart-disconnect
    /// window if it isn't already armed for this connection (§4.3).
    ArmSmartDisconnect,
    /// Best-effort teardown per the §4.2 disconnect contract.
    Disconnect,
    /// Reply with the current connection status.
    GetStatus(oneshot::Sender<ConnectionStatus>),
    /// Tear down the actor task itself (used by engine shutdown/forget).
    Shutdown,
}

impl std::fmt::Debug for SlotCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "Connect"),
            Self::ConnectionLost => write!(f, "ConnectionLost"),
            Self::ReconnectTick { attempt } => write!(f, "ReconnectTick {{ attempt: {attempt} }}"),
            Self::HealthCheck => write!(f, "HealthCheck"),
            Self::ArmSmartDisconnect => write!(f, "ArmSmartDisconnect"),
            Self::Disconnect => write!(f, "Disconnect"),
            Self::GetStatus(_) => write!(f, "GetStatus"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// One device's actor: owns a `Connector` and processes commands strictly
/// in order.
struct SlotActor {
    handle: DeviceHandle,
    kind: DeviceKind,
    connector: Connector,
    reconnect_policy: ReconnectionPolicy,
    connect_timeout: Duration,
    connect_semaphore: Arc<Semaphore>,
    transport: Arc<dyn BleTransport>,
    sink: Arc<dyn EventSink>,
    subscriptions: Arc<SubscriptionManager>,
    validator: Arc<Validator>,
    smart_disconnect: Arc<SmartDisconnectPolicy>,
    /// Silence window before a connected slot is probed (§6
    /// `idle_probe_threshold_ms`).
    idle_probe_threshold: Duration,
    session: Option<Box<dyn DeviceSession>>,
    /// Characteristics with a live CCCD subscription on the current
    /// connection, cleared on every disconnect (§4.2 step a).
    enabled_characteristics: Vec<Characteristic>,
    /// Whether the §4.3 smart-disconnect window has already been armed for
    /// the current connection.
    smart_disconnect_armed: bool,
    frame_tasks: Vec<JoinHandle<()>>,
    cancellation: CancellationToken,
    commands: mpsc::Receiver<SlotCommand>,
    self_tx: mpsc::Sender<SlotCommand>,
}

impl SlotActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    tracing::debug!(handle = %self.handle, "slot actor cancelled");
                    self.abort_frame_tasks();
                    break;
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(SlotCommand::Connect) => self.on_connect().await,
                        Some(SlotCommand::ConnectionLost) => self.on_connection_lost().await,
                        Some(SlotCommand::ReconnectTick { attempt }) => self.on_reconnect_tick(attempt).await,
                        Some(SlotCommand::HealthCheck) => self.on_health_check().await,
                        Some(SlotCommand::ArmSmartDisconnect) => self.on_arm_smart_disconnect().await,
                        Some(SlotCommand::Disconnect) => self.on_disconnect().await,
                        Some(SlotCommand::GetStatus(reply)) => {
                            let _ = reply.send(self.connector.status());
                        }
                        Some(SlotCommand::Shutdown) | None => {
                            self.abort_frame_tasks();
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn on_connect(&mut self) {
        if self.connector.is_connected() {
            // §4.2 connect contract guard: idempotent no-op.
            return;
        }
        self.connector.handle(ConnectionEvent::Connect);
        self.emit_status().await;
        match self.open_device_bounded().await {
            Ok(session) => {
                self.connector.handle(ConnectionEvent::ConnectSucceeded);
                self.session = Some(session);
                self.subscribe_and_route().await;
            }
            Err(err) => {
                tracing::warn!(handle = %self.handle, error = ?err, "connect failed");
                self.connector.handle(ConnectionEvent::ConnectFailed);
            }
        }
        self.emit_status().await;
    }

    /// Bounds concurrent connects at the engine's semaphore limit and the
    /// per-attempt deadline (§4.2 connect contract).
    async fn open_device_bounded(
        &self,
    ) -> crate::ports::ble_transport::TransportResult<Box<dyn DeviceSession>> {
        use crate::ports::ble_transport::{StatusCode, TransportError};
        let _permit = self.connect_semaphore.acquire().await;
        match tokio::time::timeout(self.connect_timeout, self.transport.open_device(self.handle)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(handle = %self.handle, "connect attempt timed out");
                Err(TransportError(StatusCode::Unreachable))
            }
        }
    }

    async fn on_connection_lost(&mut self) {
        self.abort_frame_tasks();
        self.connector.handle(ConnectionEvent::ConnectionLost);
        self.emit_status().await;
        self.schedule_reconnect(1);
    }

    async fn on_reconnect_tick(&mut self, attempt: u8) {
        if !matches!(self.connector.status(), ConnectionStatus::Reconnecting { .. }) {
            // A disconnect or reset raced ahead of this scheduled tick.
            return;
        }
        match self.open_device_bounded().await {
            Ok(session) => {
                self.connector.handle(ConnectionEvent::ReconnectSucceeded);
                self.session = Some(session);
                self.subscribe_and_route().await;
                self.emit_status().await;
            }
            Err(err) => {
                tracing::warn!(handle = %self.handle, attempt, error = ?err, "reconnect attempt failed");
                let max_attempts = self.reconnect_policy.max_attempts();
                self.connector
                    .handle(ConnectionEvent::ReconnectFailed { attempt, max_attempts });
                self.emit_status().await;
                if matches!(self.connector.status(), ConnectionStatus::Reconnecting { .. }) {
                    self.schedule_reconnect(attempt + 1);
                }
            }
        }
    }

    fn schedule_reconnect(&self, attempt: u8) {
        let Some(delay) = self.reconnect_policy.delay_for(attempt) else {
            return;
        };
        let tx = self.self_tx.clone();
        let cancellation = self.cancellation.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancellation.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(SlotCommand::ReconnectTick { attempt }).await;
                }
            }
        });
    }

    async fn on_health_check(&mut self) {
        if !self.connector.is_connected() {
            return;
        }
        let Some(session) = self.session.as_deref() else {
            return;
        };
        let last_frame = self.subscriptions.last_frame_at(self.handle);
        let has_subscription = !self.frame_tasks.is_empty();
        if !health_probe::needs_probe(last_frame, has_subscription, SystemTime::now(), self.idle_probe_threshold) {
            return;
        }
        if let ProbeOutcome::Unhealthy = health_probe::probe(session).await {
            tracing::warn!(handle = %self.handle, "health probe found slot unhealthy, disconnecting");
            self.abort_frame_tasks();
            self.teardown_session().await;
            self.connector.handle(ConnectionEvent::ConnectionLost);
            self.emit_status().await;
            self.schedule_reconnect(1);
        }
    }

    /// §4.3: a valid measurement arrived on this connection; arm the
    /// smart-disconnect window once, keyed on the authoritative
    /// `lastFrameAt` record rather than subscribe time.
    async fn on_arm_smart_disconnect(&mut self) {
        if self.smart_disconnect_armed {
            return;
        }
        self.smart_disconnect_armed = true;
        let armed_at = self.subscriptions.last_frame_at(self.handle).unwrap_or_else(SystemTime::now);
        self.arm_smart_disconnect(armed_at);
    }

    async fn on_disconnect(&mut self) {
        // Best-effort teardown; every step proceeds regardless of prior
        // failures (§4.2 disconnect contract).
        self.abort_frame_tasks();
        self.teardown_session().await;
        self.connector.handle(ConnectionEvent::Disconnect);
        self.emit_status().await;
    }

    /// §4.2 disconnect contract: clear every enabled characteristic's CCCD,
    /// then redundantly refetch services while still connected to prompt
    /// host-OS GATT cache eviction, then disconnect. Every step proceeds
    /// regardless of prior errors.
    async fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            for characteristic in self.enabled_characteristics.drain(..) {
                let _ = session.write_cccd(&characteristic, CccdValue::None).await;
            }
            for _ in 0..3 {
                let _ = session.services().await;
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            let _ = session.disconnect().await;
        }
    }

    async fn subscribe_and_route(&mut self) {
        let Some(session) = self.session.as_deref() else {
            return;
        };
        let enabled = match self
            .subscriptions
            .subscribe(self.handle, self.kind, session)
            .await
        {
            Ok(enabled) => enabled,
            Err(err) => {
                tracing::warn!(handle = %self.handle, error = ?err, "subscription enable failed");
                return;
            }
        };
        self.enabled_characteristics = enabled.iter().map(|(c, _)| c.clone()).collect();
        self.smart_disconnect_armed = false;
        let smart_disconnect = Arc::clone(&self.smart_disconnect);
        let self_tx = self.self_tx.clone();
        for (characteristic, frames) in enabled {
            self.frame_tasks.push(self.spawn_frame_task(
                characteristic,
                frames,
                Arc::clone(&smart_disconnect),
                self_tx.clone(),
            ));
        }
    }

    /// Arms the §4.3 smart auto-disconnect window for this connection,
    /// starting the clock at `armed_at` — the moment of the valid
    /// measurement that triggered arming, not subscribe time. A no-op when
    /// the policy is disabled (the default).
    fn arm_smart_disconnect(&self, armed_at: SystemTime) {
        let policy = Arc::clone(&self.smart_disconnect);
        if !policy.enabled() {
            return;
        }
        let subscriptions = Arc::clone(&self.subscriptions);
        let handle = self.handle;
        let tx = self.self_tx.clone();
        policy.arm(
            self.cancellation.clone(),
            armed_at,
            move || subscriptions.last_frame_at(handle),
            move || -> BoxFuture<'static, ()> {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(SlotCommand::Disconnect).await;
                })
            },
        );
    }

    fn spawn_frame_task(
        &self,
        characteristic: Characteristic,
        mut frames: crate::subscription::FrameStream,
        smart_disconnect: Arc<SmartDisconnectPolicy>,
        self_tx: mpsc::Sender<SlotCommand>,
    ) -> JoinHandle<()> {
        let handle = self.handle;
        let kind = self.kind;
        let sink = Arc::clone(&self.sink);
        let validator = Arc::clone(&self.validator);
        let bp_decoder = BpDecoder;
        let temp_decoder = TempDecoder;
        tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                match demux::route_for(&characteristic.uuid) {
                    Some(Route::BloodPressure) => {
                        match bp_decoder.decode(handle, &frame.bytes) {
                            Ok(mut m) => {
                                validator.validate_bp(&mut m);
                                let valid = m.valid;
                                sink.on_measurement(MeasurementEvent {
                                    handle,
                                    kind,
                                    valid,
                                    payload: Measurement::BloodPressure(m),
                                })
                                .await;
                                Self::maybe_arm_smart_disconnect(valid, &smart_disconnect, &self_tx).await;
                            }
                            Err(err) => Self::report_dropped(sink.as_ref(), handle, err).await,
                        }
                    }
                    Some(Route::Temperature) => {
                        match temp_decoder.decode(handle, &frame.bytes) {
                            Ok(mut m) => {
                                validator.validate_temp(&mut m);
                                let valid = m.valid;
                                sink.on_measurement(MeasurementEvent {
                                    handle,
                                    kind,
                                    valid,
                                    payload: Measurement::Temperature(m),
                                })
                                .await;
                                Self::maybe_arm_smart_disconnect(valid, &smart_disconnect, &self_tx).await;
                            }
                            Err(err) => Self::report_dropped(sink.as_ref(), handle, err).await,
                        }
                    }
                    None => {
                        sink.on_decoder_dropped(
                            handle,
                            format!("unrecognized characteristic {}", characteristic.uuid),
                        )
                        .await;
                    }
                }
            }
        })
    }

    /// §4.3: nudge the actor to arm its smart-disconnect window once a
    /// valid measurement has been delivered. A no-op send when the policy
    /// is disabled, so the hot frame path stays cheap by default.
    async fn maybe_arm_smart_disconnect(
        valid: bool,
        smart_disconnect: &SmartDisconnectPolicy,
        self_tx: &mpsc::Sender<SlotCommand>,
    ) {
        if valid && smart_disconnect.enabled() {
            let _ = self_tx.send(SlotCommand::ArmSmartDisconnect).await;
        }
    }

    async fn report_dropped(sink: &dyn EventSink, handle: DeviceHandle, err: DecodeError) {
        tracing::warn!(%handle, error = ?err, "frame dropped by decoder");
        sink.on_decoder_dropped(handle, err.to_string()).await;
    }

    fn abort_frame_tasks(&mut self) {
        for task in self.frame_tasks.drain(..) {
            task.abort();
        }
    }

    async fn emit_status(&self) {
        let (status, error) = match self.connector.status() {
            ConnectionStatus::Disconnected => (ConnectionStatusKind::Disconnected, None),
            ConnectionStatus::Connecting => (ConnectionStatusKind::Connecting, None),
            ConnectionStatus::Connected => (ConnectionStatusKind::Connected, None),
            ConnectionStatus::Reconnecting { .. } => (ConnectionStatusKind::Reconnecting, None),
            ConnectionStatus::Failed { reason } => (ConnectionStatusKind::Failed, Some(reason)),
        };
        self.sink
            .on_status(StatusEvent {
                handle: self.handle,
                status,
                error,
            })
            .await;
    }
}

/// A handle to a running slot actor: the command sender plus the
/// cancellation token that tears it down.
pub struct SlotHandle {
    commands: mpsc::Sender<SlotCommand>,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

impl SlotHandle {
    pub async fn send(&self, command: SlotCommand) {
        let _ = self.commands.send(command).await;
    }

    pub async fn status(&self) -> Option<ConnectionStatus> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(SlotCommand::GetStatus(tx)).await.ok()?;
        rx.await.ok()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

/// The engine's table of per-handle slots, backed by a concurrent map so
/// readers never block writers adding new handles (§5).
pub struct SlotTable {
    slots: DashMap<u64, SlotHandle>,
    connect_semaphore: Arc<Semaphore>,
    connect_timeout: Duration,
    reconnect_policy: ReconnectionPolicy,
    validator: Arc<Validator>,
    smart_disconnect: Arc<SmartDisconnectPolicy>,
    idle_probe_threshold: Duration,
}

impl SlotTable {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        concurrent_connects: usize,
        connect_timeout: Duration,
        reconnect_policy: ReconnectionPolicy,
        validator: Arc<Validator>,
        smart_disconnect_enabled: bool,
        idle_probe_threshold: Duration,
    ) -> Self {
        Self {
            slots: DashMap::new(),
            connect_semaphore: Arc::new(Semaphore::new(concurrent_connects)),
            connect_timeout,
            reconnect_policy,
            validator,
            smart_disconnect: Arc::new(SmartDisconnectPolicy::new(smart_disconnect_enabled)),
            idle_probe_threshold,
        }
    }

    /// Create a slot for `handle` if one doesn't already exist, spawning
    /// its actor task.
    pub fn ensure_slot(
        &self,
        handle: DeviceHandle,
        kind: DeviceKind,
        transport: Arc<dyn BleTransport>,
        sink: Arc<dyn EventSink>,
        subscriptions: Arc<SubscriptionManager>,
    ) {
        if self.slots.contains_key(&handle.raw()) {
            return;
        }
        let (tx, rx) = mpsc::channel(32);
        let cancellation = CancellationToken::new();
        let actor = SlotActor {
            handle,
            kind,
            connector: Connector::new(self.reconnect_policy.max_attempts()),
            reconnect_policy: self.reconnect_policy.clone(),
            connect_timeout: self.connect_timeout,
            connect_semaphore: Arc::clone(&self.connect_semaphore),
            transport,
            sink,
            subscriptions,
            validator: Arc::clone(&self.validator),
            smart_disconnect: Arc::clone(&self.smart_disconnect),
            idle_probe_threshold: self.idle_probe_threshold,
            session: None,
            enabled_characteristics: Vec::new(),
            smart_disconnect_armed: false,
            frame_tasks: Vec::new(),
            cancellation: cancellation.clone(),
            commands: rx,
            self_tx: tx.clone(),
        };
        let task = tokio::spawn(actor.run());
        self.slots.insert(
            handle.raw(),
            SlotHandle {
                commands: tx,
                cancellation,
                task,
            },
        );
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<dashmap::mapref::one::Ref<'_, u64, SlotHandle>> {
        self.slots.get(&handle.raw())
    }

    /// Sends `command` to the slot for `handle`, if one exists. Clones the
    /// sender out of the map before awaiting so the shard lock is never
    /// held across an `.await` point.
    pub async fn send(&self, handle: DeviceHandle, command: SlotCommand) {
        let commands = self.slots.get(&handle.raw()).map(|entry| entry.commands.clone());
        if let Some(commands) = commands {
            let _ = commands.send(command).await;
        }
    }

    /// Every handle with a live slot, for the health-probe sweep to iterate
    /// (§4.3). Snapshot only — handles may be added or removed concurrently.
    pub fn handles(&self) -> Vec<DeviceHandle> {
        self.slots.iter().map(|e| DeviceHandle::new(*e.key())).collect()
    }

    /// Remove and cancel a slot, e.g. on explicit forget.
    pub fn remove(&self, handle: DeviceHandle) {
        if let Some((_, slot)) = self.slots.remove(&handle.raw()) {
            slot.cancel();
        }
    }

    /// Cancel every slot in parallel and await each actor's completion with
    /// a shared `deadline` (§5 global shutdown).
    pub async fn shutdown_all(&self, deadline: Duration) {
        for entry in self.slots.iter() {
            entry.value().cancellation.cancel();
        }
        let keys: Vec<u64> = self.slots.iter().map(|e| *e.key()).collect();
        let mut tasks = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, slot)) = self.slots.remove(&key) {
                tasks.push(slot.task);
            }
        }
        if tokio::time::timeout(deadline, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            tracing::warn!("global shutdown deadline exceeded, some slot actors forcibly abandoned");
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_is_empty() {
        let table = SlotTable::new(
            5,
            Duration::from_secs(30),
            ReconnectionPolicy::default(),
            Arc::new(Validator::default()),
            false,
            Duration::from_secs(30),
        );
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }
}
