//! `btleplug`-backed `BleTransport` implementation.
//!
//! Uses the platform BLE backend (BlueZ on Linux, CoreBluetooth on macOS,
//! WinRT on Windows) to talk to real blood-pressure and thermometer
//! peripherals.

use crate::domain::device::DeviceHandle;
use crate::ports::ble_transport::{
    AdvertisementStream, Advertisement, BleTransport, CccdValue, Characteristic as CoreCharacteristic,
    DeviceSession, LinkStatus, LinkStatusStream, PairingOutcome, RawFrameStream, Service as CoreService,
    StatusCode, TransportError, TransportResult,
};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic as PlatformCharacteristic, Manager as _, Peripheral as _,
    PeripheralId, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use dashmap::DashMap;
use futures::stream::StreamExt;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const CONNECT_ATTEMPTS: u32 = 3;

/// Ensure the current thread is attached to the JVM (Android only); required
/// for btleplug JNI calls made from tokio worker threads.
#[cfg(target_os = "android")]
fn ensure_jvm_attached() -> anyhow::Result<()> {
    use jni::JavaVM;

    let vm_ptr = ndk_context::android_context().vm();
    if vm_ptr.is_null() {
        return Err(anyhow::anyhow!("AndroidContext VM pointer is null"));
    }
    let jvm = unsafe { JavaVM::from_raw(vm_ptr as *mut jni::sys::JavaVM) }
        .map_err(|e| anyhow::anyhow!("failed to create JavaVM from pointer: {:?}", e))?;
    match jvm.get_env() {
        Ok(_) => Ok(()),
        Err(jni::errors::Error::JniCall(jni::errors::JniError::ThreadDetached)) => jvm
            .attach_current_thread_permanently()
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("failed to attach thread to JVM: {:?}", e)),
        Err(e) => Err(anyhow::anyhow!("failed to check JVM attachment: {:?}", e)),
    }
}

#[cfg(not(target_os = "android"))]
fn ensure_jvm_attached() -> anyhow::Result<()> {
    Ok(())
}

/// `PeripheralId` is an opaque, platform-specific identifier with no stable
/// numeric form. We derive a deterministic `DeviceHandle` from its `Display`
/// string so the same peripheral always maps to the same handle.
fn handle_for_id(id: &PeripheralId) -> DeviceHandle {
    let mut hasher = DefaultHasher::new();
    id.to_string().hash(&mut hasher);
    DeviceHandle::new(hasher.finish())
}

fn map_err<E: std::fmt::Debug>(err: E) -> TransportError {
    tracing::warn!(?err, "btleplug call failed");
    TransportError(StatusCode::Unreachable)
}

/// Real BLE transport, backed by the host's native Bluetooth stack.
pub struct BtleplugTransport {
    adapter: Arc<Adapter>,
    handles: DashMap<u64, PeripheralId>,
}

impl BtleplugTransport {
    /// Acquire the first available adapter on the host.
    pub async fn new() -> anyhow::Result<Self> {
        ensure_jvm_attached()?;
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no BLE adapter found"))?;
        Ok(Self {
            adapter: Arc::new(adapter),
            handles: DashMap::new(),
        })
    }

    async fn peripheral_for(&self, handle: DeviceHandle) -> TransportResult<Peripheral> {
        let id = self
            .handles
            .get(&handle.raw())
            .map(|v| v.clone())
            .ok_or(TransportError(StatusCode::Unreachable))?;
        self.adapter.peripheral(&id).await.map_err(map_err)
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn start_scan(&self, service_uuids: &[Uuid]) -> TransportResult<AdvertisementStream> {
        ensure_jvm_attached().map_err(map_err)?;
        self.adapter
            .start_scan(ScanFilter {
                services: service_uuids.to_vec(),
            })
            .await
            .map_err(map_err)?;

        let events = self.adapter.events().await.map_err(map_err)?;
        let adapter = Arc::clone(&self.adapter);
        let handles = self.handles.clone();

        let stream = events.filter_map(move |event| {
            let adapter = Arc::clone(&adapter);
            let handles = handles.clone();
            async move {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => return None,
                };
                let peripheral = adapter.peripheral(&id).await.ok()?;
                let props = peripheral.properties().await.ok()??;
                let handle = handle_for_id(&id);
                handles.insert(handle.raw(), id);
                Some(Advertisement {
                    handle,
                    local_name: props.local_name,
                    service_uuids: props.services,
                    rssi: props.rssi.unwrap_or(0) as i16,
                })
            }
        });
        Ok(Box::pin(stream))
    }

    async fn stop_scan(&self) -> TransportResult<()> {
        ensure_jvm_attached().map_err(map_err)?;
        self.adapter.stop_scan().await.map_err(map_err)
    }

    async fn open_device(&self, handle: DeviceHandle) -> TransportResult<Box<dyn DeviceSession>> {
        ensure_jvm_attached().map_err(map_err)?;
        let peripheral = self.peripheral_for(handle).await?;

        let mut last_err = TransportError(StatusCode::Unreachable);
        for attempt in 1..=CONNECT_ATTEMPTS {
            ensure_jvm_attached().map_err(map_err)?;
            match peripheral.connect().await {
                Ok(()) => {
                    peripheral.discover_services().await.map_err(map_err)?;
                    return Ok(Box::new(BtleplugSession {
                        adapter: Arc::clone(&self.adapter),
                        peripheral,
                        handle,
                    }));
                }
                Err(err) => {
                    tracing::warn!(%handle, attempt, ?err, "connect attempt failed");
                    last_err = map_err(err);
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_err)
    }
}

struct BtleplugSession {
    adapter: Arc<Adapter>,
    peripheral: Peripheral,
    handle: DeviceHandle,
}

impl BtleplugSession {
    fn find(&self, ours: &CoreCharacteristic) -> TransportResult<PlatformCharacteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == ours.uuid && c.service_uuid == ours.service_uuid)
            .ok_or(TransportError(StatusCode::ProtocolError))
    }
}

#[async_trait]
impl DeviceSession for BtleplugSession {
    async fn services(&self) -> TransportResult<Vec<CoreService>> {
        let services = self
            .peripheral
            .services()
            .into_iter()
            .map(|s| CoreService {
                uuid: s.uuid,
                characteristics: s
                    .characteristics
                    .into_iter()
                    .map(|c| CoreCharacteristic {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        properties: c.properties,
                    })
                    .collect(),
            })
            .collect();
        Ok(services)
    }

    async fn pair(&self) -> TransportResult<PairingOutcome> {
        match self.peripheral.pair().await {
            Ok(()) => Ok(PairingOutcome::Paired),
            Err(err) => {
                tracing::warn!(handle = %self.handle, ?err, "pairing failed");
                Ok(PairingOutcome::Failed)
            }
        }
    }

    async fn connection_status_changes(&self) -> TransportResult<LinkStatusStream> {
        let events = self.adapter.events().await.map_err(map_err)?;
        let target = self.peripheral.id();
        let stream = events.filter_map(move |event| {
            let target = target.clone();
            async move {
                match event {
                    CentralEvent::DeviceConnected(id) if id == target => Some(LinkStatus::Connected),
                    CentralEvent::DeviceDisconnected(id) if id == target => Some(LinkStatus::Disconnected),
                    _ => None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn read_cccd(&self, _characteristic: &CoreCharacteristic) -> TransportResult<CccdValue> {
        // btleplug hides descriptor-level CCCD state behind subscribe/unsubscribe
        // on every platform it supports; there is no portable way to read the
        // live value back, so callers always see `None` here and rely on the
        // write path being idempotent.
        Ok(CccdValue::None)
    }

    async fn write_cccd(&self, characteristic: &CoreCharacteristic, value: CccdValue) -> TransportResult<()> {
        let platform_char = self.find(characteristic)?;
        match value {
            CccdValue::None => self.peripheral.unsubscribe(&platform_char).await.map_err(map_err),
            CccdValue::Notify | CccdValue::Indicate => {
                self.peripheral.subscribe(&platform_char).await.map_err(map_err)
            }
        }
    }

    async fn subscribe(&self, characteristic: &CoreCharacteristic) -> TransportResult<RawFrameStream> {
        let platform_char = self.find(characteristic)?;
        self.peripheral.subscribe(&platform_char).await.map_err(map_err)?;
        let target_uuid = characteristic.uuid;
        let notifications = self.peripheral.notifications().await.map_err(map_err)?;
        let stream = notifications.filter_map(move |n| {
            let matches = n.uuid == target_uuid;
            async move { matches.then_some(n.value) }
        });
        Ok(Box::pin(stream))
    }

    async fn disconnect(&self) -> TransportResult<()> {
        // Ignore "not connected" style errors; the contract is best-effort.
        let _ = self.peripheral.disconnect().await;
        Ok(())
    }
}
