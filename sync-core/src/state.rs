//! Connection state machine for wearsync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! session between the wearable and its companion. The state machine takes
//! events as input and produces a new state plus a list of actions to
//! execute.
//!
//! The actual I/O (connecting, closing the link) is performed by
//! sync-client, not by this module.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected ◀──resume── Suspended
//!      ▲                        │                  │ └──suspend──────────▲
//!      └────────failed──────────┘◀──lost/disconnect┘
//! ```
//!
//! Every connect attempt carries a number. Each attempt ends with exactly
//! one of [`ConnectionEvent::Connected`], [`ConnectionEvent::Suspended`] or
//! [`ConnectionEvent::Failed`], including attempts abandoned by a disconnect.

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session. Also the resting state after a failure.
    Disconnected,
    /// Connection attempt in progress.
    Connecting {
        /// Attempt number of the in-flight connect.
        attempt: u64,
    },
    /// Session established; requests can be sent.
    Connected,
    /// Session exists but the link is temporarily unusable.
    Suspended {
        /// Opaque code reported by the transport.
        code: i32,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Connect requests
            (Self::Disconnected, Event::ConnectRequested { attempt }) => {
                (Self::Connecting { attempt }, vec![Action::Connect { attempt }])
            }
            (state, Event::ConnectRequested { .. }) => (state, vec![]),

            // Attempt outcomes
            (Self::Connecting { attempt }, Event::ConnectSucceeded { attempt: done })
                if attempt == done =>
            {
                (
                    Self::Connected,
                    vec![Action::Emit(ConnectionEvent::Connected)],
                )
            }
            (Self::Connecting { attempt }, Event::ConnectFailed { attempt: done, reason })
                if attempt == done =>
            {
                (
                    Self::Disconnected,
                    vec![Action::Emit(ConnectionEvent::Failed { reason })],
                )
            }
            (Self::Disconnected, Event::ConnectSucceeded { .. }) => (
                Self::Disconnected,
                vec![
                    Action::Disconnect,
                    Action::Emit(ConnectionEvent::Failed {
                        reason: "attempt abandoned by disconnect".into(),
                    }),
                ],
            ),
            (state, Event::ConnectSucceeded { attempt }) => (
                state,
                vec![Action::Emit(ConnectionEvent::Failed {
                    reason: format!("attempt {} superseded", attempt),
                })],
            ),
            (state, Event::ConnectFailed { reason, .. }) => (
                state,
                vec![Action::Emit(ConnectionEvent::Failed { reason })],
            ),

            // Link health
            (Self::Connected, Event::LinkSuspended { code }) => (
                Self::Suspended { code },
                vec![Action::Emit(ConnectionEvent::Suspended { code })],
            ),
            (Self::Suspended { .. }, Event::LinkSuspended { code }) => {
                (Self::Suspended { code }, vec![])
            }
            (Self::Suspended { .. }, Event::LinkResumed) => (
                Self::Connected,
                vec![Action::Emit(ConnectionEvent::Connected)],
            ),
            (Self::Connected | Self::Suspended { .. }, Event::LinkLost { reason }) => (
                Self::Disconnected,
                vec![
                    Action::Disconnect,
                    Action::Emit(ConnectionEvent::Failed { reason }),
                ],
            ),

            // Teardown
            (Self::Disconnected, Event::DisconnectRequested) => (Self::Disconnected, vec![]),
            (_, Event::DisconnectRequested) => (Self::Disconnected, vec![Action::Disconnect]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if requests can be sent right now.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a connect attempt is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. })
    }

    /// Check if a session exists, usable or not.
    pub fn has_session(&self) -> bool {
        matches!(self, Self::Connected | Self::Suspended { .. })
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Someone asked for a session.
    ConnectRequested {
        /// Number assigned to this attempt.
        attempt: u64,
    },
    /// Transport connect finished successfully.
    ConnectSucceeded {
        /// The attempt that finished.
        attempt: u64,
    },
    /// Transport connect failed.
    ConnectFailed {
        /// The attempt that finished.
        attempt: u64,
        /// Opaque diagnostic from the transport.
        reason: String,
    },
    /// Transport reported a transient outage.
    LinkSuspended {
        /// Opaque code from the transport.
        code: i32,
    },
    /// Transport recovered from a suspension.
    LinkResumed,
    /// Transport lost the session for good.
    LinkLost {
        /// Opaque diagnostic from the transport.
        reason: String,
    },
    /// Someone asked to tear the session down.
    DisconnectRequested,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start a transport connect for the given attempt.
    Connect {
        /// Attempt number to report back with.
        attempt: u64,
    },
    /// Close the transport session.
    Disconnect,
    /// Notify observers.
    Emit(ConnectionEvent),
}

/// Events surfaced to connection observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Session is usable.
    Connected,
    /// Session is temporarily unusable.
    Suspended {
        /// Opaque code from the transport.
        code: i32,
    },
    /// Connect attempt or session failed; the manager is Disconnected.
    Failed {
        /// Opaque diagnostic, not parsed.
        reason: String,
    },
}
