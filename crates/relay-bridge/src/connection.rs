//! Per-project connection lifecycle, expressed as an explicit state machine.
//!
//! The transition function is pure and synchronous so it can be unit tested
//! without a socket; [`crate::bridge`] drives it from the actual connection
//! task as transport and protocol events occur.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    HandshakePending,
    Ready,
    Closing,
    Closed,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::HandshakePending => "handshake_pending",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    Open,
    TransportOpen,
    WelcomeReceived,
    HandshakeTimedOut,
    TransportClosed,
    Disconnect,
    ReconnectScheduled,
    ReconnectAttemptStarted,
    ShutdownRequested,
}

impl std::fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionEvent::Open => "open",
            ConnectionEvent::TransportOpen => "transport_open",
            ConnectionEvent::WelcomeReceived => "welcome_received",
            ConnectionEvent::HandshakeTimedOut => "handshake_timed_out",
            ConnectionEvent::TransportClosed => "transport_closed",
            ConnectionEvent::Disconnect => "disconnect",
            ConnectionEvent::ReconnectScheduled => "reconnect_scheduled",
            ConnectionEvent::ReconnectAttemptStarted => "reconnect_attempt_started",
            ConnectionEvent::ShutdownRequested => "shutdown_requested",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid transition: state {state} does not accept event {event}")]
pub struct InvalidTransition {
    pub state: ConnectionState,
    pub event: ConnectionEvent,
}

/// Tracks one project connection's lifecycle state and the history of
/// transitions taken, mirroring the agent-lifecycle state machine elsewhere
/// in this codebase.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    current: ConnectionState,
    history: Vec<(ConnectionState, ConnectionEvent, ConnectionState)>,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            current: ConnectionState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.current
    }

    pub fn history(&self) -> &[(ConnectionState, ConnectionEvent, ConnectionState)] {
        &self.history
    }

    /// Valid transitions:
    /// - `Idle --Open--> Connecting`
    /// - `Connecting --TransportOpen--> HandshakePending`
    /// - `Connecting --TransportClosed--> Closed`
    /// - `HandshakePending --WelcomeReceived--> Ready`
    /// - `HandshakePending --HandshakeTimedOut--> Closed`
    /// - `HandshakePending --TransportClosed--> Closed`
    /// - `Ready --TransportClosed--> Closed`
    /// - `Ready --Disconnect--> Closing`
    /// - `Closing --TransportClosed--> Closed`
    /// - `Closed --ReconnectScheduled--> Reconnecting`
    /// - `Reconnecting --ReconnectAttemptStarted--> Connecting`
    /// - any state `--ShutdownRequested--> Closed`
    pub fn transition(
        &mut self,
        event: ConnectionEvent,
    ) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionEvent::*;
        use ConnectionState::*;

        let next = match (self.current, event) {
            (Idle, Open) => Connecting,
            (Connecting, TransportOpen) => HandshakePending,
            (Connecting, TransportClosed) => Closed,
            (HandshakePending, WelcomeReceived) => Ready,
            (HandshakePending, HandshakeTimedOut) => Closed,
            (HandshakePending, TransportClosed) => Closed,
            (Ready, TransportClosed) => Closed,
            (Ready, Disconnect) => Closing,
            (Closing, TransportClosed) => Closed,
            (Closed, ReconnectScheduled) => Reconnecting,
            (Reconnecting, ReconnectAttemptStarted) => Connecting,
            (_, ShutdownRequested) => Closed,
            (state, event) => return Err(InvalidTransition { state, event }),
        };

        tracing::debug!(from = %self.current, %event, to = %next, "connection state transition");
        self.history.push((self.current, event, next));
        self.current = next;
        Ok(next)
    }

    pub fn can_transition(&self, event: ConnectionEvent) -> bool {
        use ConnectionEvent::*;
        use ConnectionState::*;

        matches!(
            (self.current, event),
            (Idle, Open)
                | (Connecting, TransportOpen)
                | (Connecting, TransportClosed)
                | (HandshakePending, WelcomeReceived)
                | (HandshakePending, HandshakeTimedOut)
                | (HandshakePending, TransportClosed)
                | (Ready, TransportClosed)
                | (Ready, Disconnect)
                | (Closing, TransportClosed)
                | (Closed, ReconnectScheduled)
                | (Reconnecting, ReconnectAttemptStarted)
                | (_, ShutdownRequested)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_ready() {
        let mut sm = ConnectionStateMachine::new();
        assert_eq!(sm.transition(ConnectionEvent::Open).unwrap(), ConnectionState::Connecting);
        assert_eq!(
            sm.transition(ConnectionEvent::TransportOpen).unwrap(),
            ConnectionState::HandshakePending
        );
        assert_eq!(
            sm.transition(ConnectionEvent::WelcomeReceived).unwrap(),
            ConnectionState::Ready
        );
        assert_eq!(sm.history().len(), 3);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut sm = ConnectionStateMachine::new();
        let err = sm.transition(ConnectionEvent::WelcomeReceived).unwrap_err();
        assert_eq!(err.state, ConnectionState::Idle);
        assert_eq!(err.event, ConnectionEvent::WelcomeReceived);
        // failed transitions do not get recorded
        assert!(sm.history().is_empty());
    }

    #[test]
    fn shutdown_is_accepted_from_any_state() {
        for state_setup in [
            vec![ConnectionEvent::Open],
            vec![
                ConnectionEvent::Open,
                ConnectionEvent::TransportOpen,
                ConnectionEvent::WelcomeReceived,
            ],
        ] {
            let mut sm = ConnectionStateMachine::new();
            for ev in state_setup {
                sm.transition(ev).unwrap();
            }
            assert_eq!(
                sm.transition(ConnectionEvent::ShutdownRequested).unwrap(),
                ConnectionState::Closed
            );
        }
    }

    #[test]
    fn reconnect_cycle_returns_to_connecting() {
        let mut sm = ConnectionStateMachine::new();
        sm.transition(ConnectionEvent::Open).unwrap();
        sm.transition(ConnectionEvent::TransportOpen).unwrap();
        sm.transition(ConnectionEvent::HandshakeTimedOut).unwrap();
        assert_eq!(sm.state(), ConnectionState::Closed);
        sm.transition(ConnectionEvent::ReconnectScheduled).unwrap();
        assert_eq!(sm.state(), ConnectionState::Reconnecting);
        assert_eq!(
            sm.transition(ConnectionEvent::ReconnectAttemptStarted).unwrap(),
            ConnectionState::Connecting
        );
    }

    #[test]
    fn can_transition_matches_transition_result() {
        let sm = ConnectionStateMachine::new();
        assert!(sm.can_transition(ConnectionEvent::Open));
        assert!(!sm.can_transition(ConnectionEvent::WelcomeReceived));
    }
}
