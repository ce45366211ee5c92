//! Detects dead connections on hosts whose disconnect events are slow or
//! unreliable, and optionally forces a periodic disconnect to dodge GATT
//! cache corruption on hosts that need it (§4.3).

use crate::ports::ble_transport::DeviceSession;
use futures::future::BoxFuture;
use std::time::{Duration, SystemTime};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);
/// Default silence window before a probe, used when `EngineConfig` isn't
/// threaded through (e.g. direct `needs_probe` callers in tests).
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(30);
const PROBE_DEADLINE: Duration = Duration::from_secs(2);
const SILENCE_CHECK: Duration = Duration::from_secs(25);
const EXTENSION: Duration = Duration::from_secs(30);
const COOLDOWN: Duration = Duration::from_secs(5);

/// The result of actively probing a connection believed to be silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy,
}

/// Fetches the device's service catalogue with a hard deadline; any
/// non-success result, including the deadline itself expiring, marks the
/// slot unhealthy.
pub async fn probe(session: &dyn DeviceSession) -> ProbeOutcome {
    match timeout(PROBE_DEADLINE, session.services()).await {
        Ok(Ok(_)) => ProbeOutcome::Healthy,
        Ok(Err(err)) => {
            tracing::warn!(error = ?err, "health probe fetch failed");
            ProbeOutcome::Unhealthy
        }
        Err(_) => {
            tracing::warn!("health probe deadline exceeded");
            ProbeOutcome::Unhealthy
        }
    }
}

/// Whether a sweep should probe this slot: connected, at least one live
/// subscription, and silent past `idle_threshold` (the configured
/// `idle_probe_threshold_ms`).
pub fn needs_probe(
    last_frame_at: Option<SystemTime>,
    has_subscription: bool,
    now: SystemTime,
    idle_threshold: Duration,
) -> bool {
    if !has_subscription {
        return false;
    }
    match last_frame_at {
        Some(at) => now.duration_since(at).unwrap_or_default() > idle_threshold,
        None => false,
    }
}

/// Smart auto-disconnect (§4.3), off by default. Some hosts corrupt their
/// GATT cache on long-held connections; this periodically forces a clean
/// reconnect rather than waiting for that corruption to surface as garbled
/// frames.
pub struct SmartDisconnectPolicy {
    enabled: bool,
}

impl SmartDisconnectPolicy {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Arms one connection window's timer, starting from `armed_at` (the
    /// moment of the measurement that triggers arming). Bound to
    /// `cancellation` so slot teardown or engine shutdown can never leak
    /// this task (§9 design note on fire-and-forget leaks).
    ///
    /// `last_frame_at` polls the current liveness record; `disconnect`
    /// performs the clean teardown (§4.2 disconnect contract) when the
    /// window decides to fire.
    pub fn arm(
        &self,
        cancellation: CancellationToken,
        armed_at: SystemTime,
        last_frame_at: impl Fn() -> Option<SystemTime> + Send + 'static,
        disconnect: impl FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    ) {
        if !self.enabled {
            return;
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = tokio::time::sleep(SILENCE_CHECK) => {}
            }
            let frame_since_arm = last_frame_at().map(|t| t > armed_at).unwrap_or(false);
            if !frame_since_arm {
                tracing::info!("smart disconnect: no frame in first 25s window, disconnecting");
                disconnect().await;
                tokio::time::sleep(COOLDOWN).await;
                return;
            }

            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = tokio::time::sleep(EXTENSION) => {}
            }
            tracing::info!("smart disconnect: extended window elapsed, forcing disconnect");
            disconnect().await;
            tokio::time::sleep(COOLDOWN).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn needs_probe_false_without_subscription() {
        let now = SystemTime::now();
        assert!(!needs_probe(Some(now - IDLE_THRESHOLD * 2), false, now, IDLE_THRESHOLD));
    }

    #[test]
    fn needs_probe_false_when_recently_active() {
        let now = SystemTime::now();
        assert!(!needs_probe(Some(now - StdDuration::from_secs(5)), true, now, IDLE_THRESHOLD));
    }

    #[test]
    fn needs_probe_true_when_silent_past_threshold() {
        let now = SystemTime::now();
        let stale = now - (IDLE_THRESHOLD + StdDuration::from_secs(1));
        assert!(needs_probe(Some(stale), true, now, IDLE_THRESHOLD));
    }

    #[test]
    fn needs_probe_false_with_no_liveness_record_yet() {
        let now = SystemTime::now();
        assert!(!needs_probe(None, true, now, IDLE_THRESHOLD));
    }

    #[test]
    fn needs_probe_respects_a_configured_threshold_other_than_the_default() {
        let now = SystemTime::now();
        let custom = StdDuration::from_secs(5);
        assert!(!needs_probe(Some(now - StdDuration::from_secs(3)), true, now, custom));
        assert!(needs_probe(Some(now - StdDuration::from_secs(6)), true, now, custom));
    }

    #[test]
    fn policy_disabled_by_default_flag_is_respected() {
        let policy = SmartDisconnectPolicy::new(false);
        assert!(!policy.enabled());
        let policy = SmartDisconnectPolicy::new(true);
        assert!(policy.enabled());
    }
}
