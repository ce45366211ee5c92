//! Ensures OS-level pairing before a connect attempt (§2, §4.1,
//! SUPPLEMENT-2).

use crate::domain::device::DeviceHandle;
use crate::ports::ble_transport::{BleTransport, DeviceSession, PairingOutcome, TransportResult};
use std::sync::Arc;

/// Ensures a device is paired, treating an already-paired report as
/// success (idempotent, per §3's Subscription invariants).
pub struct Pairer {
    transport: Arc<dyn BleTransport>,
}

impl Pairer {
    pub fn new(transport: Arc<dyn BleTransport>) -> Self {
        Self { transport }
    }

    /// Open a device session and ensure pairing. Returns the open session
    /// on success so the caller doesn't have to reopen it for connect.
    pub async fn ensure_paired(
        &self,
        handle: DeviceHandle,
    ) -> TransportResult<Box<dyn DeviceSession>> {
        let session = self.transport.open_device(handle).await?;
        match session.pair().await? {
            PairingOutcome::Paired | PairingOutcome::AlreadyPaired => Ok(session),
            PairingOutcome::Failed => {
                Err(crate::ports::ble_transport::TransportError(
                    crate::ports::ble_transport::StatusCode::AccessDenied,
                ))
            }
        }
    }
}
