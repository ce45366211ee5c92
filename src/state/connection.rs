//! Per-device connection state machine, driven by `statig`.
//!
//! Implements §4.2's automaton exactly: `Disconnected` is initial,
//! `Connected` is the only state with live subscriptions, `Failed` is
//! terminal without an external `reset()`. The transport's own service
//! discovery happens inside the `Connecting` state's side effects (this
//! engine's connect contract performs discovery as part of connect, so
//! there is no separately-visible "discovering services" state).

#![allow(missing_docs)] // statig macro generates code that triggers missing_docs warnings

use crate::domain::reconnection::ConnectionStatus;
use statig::prelude::*;

/// Events that drive the per-device connection state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Caller requests a connection.
    Connect,
    /// The transport reported a successful connect + service discovery.
    ConnectSucceeded,
    /// The transport reported a connect failure (including timeout).
    ConnectFailed,
    /// The transport or `HealthProbe` reported the live connection lost.
    ConnectionLost,
    /// A reconnection attempt succeeded.
    ReconnectSucceeded,
    /// A reconnection attempt failed; carries the attempt number just
    /// completed so the state can decide whether the schedule is exhausted.
    ReconnectFailed { attempt: u8, max_attempts: u8 },
    /// Caller requests disconnect.
    Disconnect,
    /// Caller resets a `Failed` slot back to `Disconnected`.
    Reset,
}

/// States of the per-device connection lifecycle (§4.2).
#[derive(Debug, Default, Clone, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting {
        attempt: u8,
    },
    Failed {
        reason: String,
    },
}

#[state_machine(
    initial = "State::disconnected()",
    state(derive(Debug, PartialEq)),
    on_transition = "Self::on_transition"
)]
impl ConnectionState {
    #[state]
    fn disconnected(event: &ConnectionEvent) -> Response<State> {
        match event {
            ConnectionEvent::Connect => Transition(State::connecting()),
            _ => Super,
        }
    }

    #[state]
    fn connecting(event: &ConnectionEvent) -> Response<State> {
        match event {
            ConnectionEvent::ConnectSucceeded => Transition(State::connected()),
            ConnectionEvent::ConnectFailed => Transition(State::failed("connect failed".into())),
            ConnectionEvent::Disconnect => Transition(State::disconnected()),
            _ => Super,
        }
    }

    #[state]
    fn connected(event: &ConnectionEvent) -> Response<State> {
        match event {
            // Connecting while already connected is idempotent (§4.2 connect
            // contract guard); the state machine itself only sees the
            // events the Connector chooses to send it, so a connect()
            // against an already-Connected slot never reaches here at all.
            ConnectionEvent::ConnectionLost => Transition(State::reconnecting(1)),
            ConnectionEvent::Disconnect => Transition(State::disconnected()),
            _ => Super,
        }
    }

    #[state]
    fn reconnecting(attempt: &u8, event: &ConnectionEvent) -> Response<State> {
        match event {
            ConnectionEvent::ReconnectSucceeded => Transition(State::connected()),
            ConnectionEvent::ReconnectFailed { max_attempts, .. } => {
                if *attempt >= *max_attempts {
                    Transition(State::failed("reconnection attempts exhausted".into()))
                } else {
                    Transition(State::reconnecting(attempt + 1))
                }
            }
            ConnectionEvent::Disconnect => Transition(State::disconnected()),
            _ => Super,
        }
    }

    #[state]
    fn failed(reason: &String, event: &ConnectionEvent) -> Response<State> {
        match event {
            ConnectionEvent::Reset => Transition(State::disconnected()),
            _ => {
                let _ = reason;
                Super
            }
        }
    }

    fn on_transition(&mut self, source: &State, target: &State) {
        tracing::info!(?source, ?target, "connection state transition");
    }
}

/// Project a statig `State` onto the `EventSink`-facing `ConnectionStatus`.
pub fn to_connection_status(state: &State, max_attempts: u8) -> ConnectionStatus {
    match state {
        State::Disconnected {} => ConnectionStatus::Disconnected,
        State::Connecting {} => ConnectionStatus::Connecting,
        State::Connected {} => ConnectionStatus::Connected,
        State::Reconnecting { attempt } => ConnectionStatus::Reconnecting {
            attempt: *attempt,
            max_attempts,
        },
        State::Failed { reason } => ConnectionStatus::Failed {
            reason: reason.clone(),
        },
    }
}

/// Owns one device's state machine, wrapping the statig-generated machinery
/// behind a small, typed API.
pub struct Connector {
    machine: statig::blocking::InitializedStateMachine<ConnectionState>,
    max_attempts: u8,
}

impl Connector {
    pub fn new(max_attempts: u8) -> Self {
        Self {
            machine: ConnectionState::default().uninitialized_state_machine().init(),
            max_attempts,
        }
    }

    pub fn handle(&mut self, event: ConnectionEvent) {
        tracing::debug!(?event, "connector handling event");
        self.machine.handle(&event);
    }

    pub fn state(&self) -> &State {
        self.machine.state()
    }

    pub fn status(&self) -> ConnectionStatus {
        to_connection_status(self.state(), self.max_attempts)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), State::Connected {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let c = Connector::new(3);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn full_connect_flow() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::Connect);
        assert_eq!(c.status(), ConnectionStatus::Connecting);
        c.handle(ConnectionEvent::ConnectSucceeded);
        assert!(c.is_connected());
    }

    #[test]
    fn connect_failure_goes_to_failed() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::Connect);
        c.handle(ConnectionEvent::ConnectFailed);
        assert_eq!(
            c.status(),
            ConnectionStatus::Failed {
                reason: "connect failed".into()
            }
        );
    }

    #[test]
    fn failed_resets_to_disconnected() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::Connect);
        c.handle(ConnectionEvent::ConnectFailed);
        c.handle(ConnectionEvent::Reset);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn connection_lost_starts_reconnecting_at_attempt_one() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::Connect);
        c.handle(ConnectionEvent::ConnectSucceeded);
        c.handle(ConnectionEvent::ConnectionLost);
        assert_eq!(
            c.status(),
            ConnectionStatus::Reconnecting {
                attempt: 1,
                max_attempts: 3
            }
        );
    }

    #[test]
    fn reconnect_exhaustion_transitions_to_failed() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::Connect);
        c.handle(ConnectionEvent::ConnectSucceeded);
        c.handle(ConnectionEvent::ConnectionLost);
        c.handle(ConnectionEvent::ReconnectFailed { attempt: 1, max_attempts: 3 });
        assert_eq!(
            c.status(),
            ConnectionStatus::Reconnecting { attempt: 2, max_attempts: 3 }
        );
        c.handle(ConnectionEvent::ReconnectFailed { attempt: 2, max_attempts: 3 });
        assert_eq!(
            c.status(),
            ConnectionStatus::Reconnecting { attempt: 3, max_attempts: 3 }
        );
        c.handle(ConnectionEvent::ReconnectFailed { attempt: 3, max_attempts: 3 });
        assert_eq!(
            c.status(),
            ConnectionStatus::Failed {
                reason: "reconnection attempts exhausted".into()
            }
        );
    }

    #[test]
    fn reconnect_success_returns_to_connected() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::Connect);
        c.handle(ConnectionEvent::ConnectSucceeded);
        c.handle(ConnectionEvent::ConnectionLost);
        c.handle(ConnectionEvent::ReconnectSucceeded);
        assert!(c.is_connected());
    }

    #[test]
    fn disconnect_from_connected_returns_to_disconnected() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::Connect);
        c.handle(ConnectionEvent::ConnectSucceeded);
        c.handle(ConnectionEvent::Disconnect);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn disconnect_from_reconnecting_returns_to_disconnected() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::Connect);
        c.handle(ConnectionEvent::ConnectSucceeded);
        c.handle(ConnectionEvent::ConnectionLost);
        c.handle(ConnectionEvent::Disconnect);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn invalid_events_are_ignored() {
        let mut c = Connector::new(3);
        c.handle(ConnectionEvent::ConnectSucceeded);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
        c.handle(ConnectionEvent::ConnectionLost);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
    }
}
