//! Reconnection policy and connection status types.
//!
//! Unlike a general-purpose exponential backoff, this policy is a short,
//! strict schedule: three attempts at 1 s, 2 s, and 4 s, after which the
//! slot gives up. The schedule is configurable (it mirrors
//! `EngineConfig::reconnect_backoff_ms`) but defaults to exactly that list.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The reconnection backoff schedule for a connection slot. `backoff_ms[i]`
/// is the delay before attempt `i + 1`; the number of entries is the
/// maximum attempt count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectionPolicy {
    /// Ordered list of delays, in milliseconds, one per attempt.
    pub backoff_ms: Vec<u64>,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: vec![1000, 2000, 4000],
        }
    }
}

impl ReconnectionPolicy {
    /// The number of reconnection attempts this policy allows before the
    /// slot transitions to `Failed`.
    pub fn max_attempts(&self) -> u8 {
        self.backoff_ms.len() as u8
    }

    /// The delay before a given 1-indexed attempt, or `None` if `attempt`
    /// exceeds the schedule (the caller should treat this as exhausted).
    ///
    /// # Examples
    ///
    /// ```
    /// use phd_ingest::domain::reconnection::ReconnectionPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = ReconnectionPolicy::default();
    /// assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
    /// assert_eq!(policy.delay_for(2), Some(Duration::from_secs(2)));
    /// assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
    /// assert_eq!(policy.delay_for(4), None);
    /// ```
    pub fn delay_for(&self, attempt: u8) -> Option<Duration> {
        let idx = attempt.checked_sub(1)?;
        self.backoff_ms
            .get(idx as usize)
            .map(|ms| Duration::from_millis(*ms))
    }
}

/// Current connection status of a BLE device, as reported at the
/// `EventSink` boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u8, max_attempts: u8 },
    Failed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_1_2_4_seconds() {
        let policy = ReconnectionPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn exhausted_after_schedule_length() {
        let policy = ReconnectionPolicy::default();
        assert_eq!(policy.delay_for(4), None);
    }

    #[test]
    fn zero_attempt_is_none() {
        let policy = ReconnectionPolicy::default();
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn status_round_trips_through_json() {
        let statuses = vec![
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Reconnecting {
                attempt: 2,
                max_attempts: 3,
            },
            ConnectionStatus::Failed {
                reason: "exhausted".into(),
            },
        ];
        for status in statuses {
            let json = serde_json::to_string(&status).unwrap();
            let back: ConnectionStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, back);
        }
    }
}
