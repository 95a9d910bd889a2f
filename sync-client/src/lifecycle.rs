//! Connection lifecycle manager.
//!
//! [`ConnectionManager`] drives the pure state machine from sync-core and
//! interprets its actions against a [`Transport`]:
//!
//! ```text
//! connect() ──▶ ConnectionState ──▶ Action::Connect ──▶ spawned attempt
//!                     ▲                                      │
//!                     └────── ConnectSucceeded / Failed ◀────┘
//! ```
//!
//! Observers subscribe to a broadcast of [`ConnectionEvent`]s. The state
//! lock is a plain mutex held only for the transition itself, never across
//! transport I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sync_core::{Action, ConnectionEvent, ConnectionState, Event};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::transport::{Transport, TransportEvent};

/// Capacity of the connection event broadcast.
const EVENT_CAPACITY: usize = 32;

/// Owns the session with the data layer.
///
/// Clones share the same session and state.
pub struct ConnectionManager<T: Transport + 'static> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: Arc<T>,
    state: Mutex<ConnectionState>,
    next_attempt: AtomicU64,
    connect_timeout: Duration,
    events: broadcast::Sender<ConnectionEvent>,
}

impl<T: Transport + 'static> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static> ConnectionManager<T> {
    /// Create a manager over `transport`. Nothing is connected yet.
    pub fn new(transport: Arc<T>, connect_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                state: Mutex::new(ConnectionState::new()),
                next_attempt: AtomicU64::new(0),
                connect_timeout,
                events,
            }),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.current()
    }

    /// True once the session is established and not suspended.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receive connection events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Begin connecting, unless a session exists or an attempt is running.
    ///
    /// Returns immediately; the outcome arrives as a [`ConnectionEvent`].
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let attempt = self.inner.next_attempt.fetch_add(1, Ordering::Relaxed) + 1;
        for action in self.inner.transition(Event::ConnectRequested { attempt }) {
            match action {
                Action::Connect { attempt } => {
                    debug!(attempt, "starting connection attempt");
                    tokio::spawn(run_attempt(Arc::clone(&self.inner), attempt));
                }
                other => self.inner.emit_only(other),
            }
        }
    }

    /// Tear the session down. Idempotent.
    ///
    /// An attempt still in flight reports `Failed` when it finishes.
    pub async fn disconnect(&self) {
        let actions = self.inner.transition(Event::DisconnectRequested);
        self.inner.finish(actions).await;
    }

    /// Feed a link event reported by the transport.
    ///
    /// Returns false for events that are not about the link.
    pub async fn on_transport_event(&self, event: &TransportEvent) -> bool {
        let event = match event {
            TransportEvent::Suspended { code } => Event::LinkSuspended { code: *code },
            TransportEvent::Resumed => Event::LinkResumed,
            TransportEvent::Lost { reason } => Event::LinkLost {
                reason: reason.clone(),
            },
            TransportEvent::DataChanged(_) | TransportEvent::DataDeleted { .. } => return false,
        };
        let actions = self.inner.transition(event);
        self.inner.finish(actions).await;
        true
    }
}

impl<T: Transport + 'static> Inner<T> {
    fn current(&self) -> ConnectionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn transition(&self, event: Event) -> Vec<Action> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let from = state.clone();
        let (next, actions) = std::mem::take(&mut *state).on_event(event);
        if next != from {
            debug!(?from, to = ?next, "connection state changed");
        }
        *state = next;
        actions
    }

    /// Execute teardown and notification actions.
    ///
    /// Only `connect()` starts attempts; a `Connect` action here would mean
    /// the state machine requested one outside a connect request.
    async fn finish(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Disconnect => {
                    if let Err(e) = self.transport.close().await {
                        warn!(error = %e, "closing transport failed");
                    }
                }
                Action::Emit(event) => self.emit(event),
                Action::Connect { attempt } => {
                    debug!(attempt, "ignoring connect action outside connect()");
                }
            }
        }
    }

    fn emit_only(&self, action: Action) {
        if let Action::Emit(event) = action {
            self.emit(event);
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        match &event {
            ConnectionEvent::Connected => info!("connected to data layer"),
            ConnectionEvent::Suspended { code } => warn!(code, "connection suspended"),
            ConnectionEvent::Failed { reason } => warn!(%reason, "connection failed"),
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn run_attempt<T: Transport + 'static>(inner: Arc<Inner<T>>, attempt: u64) {
    let outcome = tokio::time::timeout(inner.connect_timeout, inner.transport.connect()).await;
    let event = match outcome {
        Ok(Ok(())) => Event::ConnectSucceeded { attempt },
        Ok(Err(e)) => Event::ConnectFailed {
            attempt,
            reason: e.to_string(),
        },
        Err(_) => Event::ConnectFailed {
            attempt,
            reason: format!("connect timed out after {:?}", inner.connect_timeout),
        },
    };
    let actions = inner.transition(event);
    inner.finish(actions).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn manager() -> (ConnectionManager<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let manager = ConnectionManager::new(Arc::new(transport.clone()), Duration::from_secs(30));
        (manager, transport)
    }

    async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no connection event")
            .unwrap()
    }

    #[tokio::test]
    async fn connect_emits_connected() {
        let (manager, transport) = manager();
        let mut events = manager.subscribe();

        manager.connect();
        assert!(manager.state().is_connecting());

        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
        assert!(manager.is_connected());
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn connect_failure_is_transient() {
        let (manager, transport) = manager();
        let mut events = manager.subscribe();
        transport.fail_next_connect("bluetooth off");

        manager.connect();

        match next_event(&mut events).await {
            ConnectionEvent::Failed { reason } => assert!(reason.contains("bluetooth off")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Retrying is allowed
        manager.connect();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (manager, transport) = manager();
        let mut events = manager.subscribe();

        manager.connect();
        manager.connect();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

        manager.connect();
        tokio::task::yield_now().await;
        assert_eq!(transport.connect_calls(), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_connect_times_out() {
        let transport = MockTransport::new();
        transport.hang_connect(true);
        let manager = ConnectionManager::new(Arc::new(transport.clone()), Duration::from_secs(3));
        let mut events = manager.subscribe();

        manager.connect();

        match next_event(&mut events).await {
            ConnectionEvent::Failed { reason } => assert!(reason.contains("timed out")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_mid_attempt_yields_one_failed() {
        let (manager, transport) = manager();
        let mut events = manager.subscribe();

        manager.connect();
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        match next_event(&mut events).await {
            ConnectionEvent::Failed { .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
        // The late success was torn down again
        tokio::task::yield_now().await;
        assert!(!transport.is_connected());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (manager, transport) = manager();
        let mut events = manager.subscribe();
        manager.connect();
        next_event(&mut events).await;

        manager.disconnect().await;
        manager.disconnect().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(transport.close_calls(), 1);
    }

    #[tokio::test]
    async fn link_suspend_and_resume() {
        let (manager, _transport) = manager();
        let mut events = manager.subscribe();
        manager.connect();
        next_event(&mut events).await;

        assert!(
            manager
                .on_transport_event(&TransportEvent::Suspended { code: 1 })
                .await
        );
        assert_eq!(
            next_event(&mut events).await,
            ConnectionEvent::Suspended { code: 1 }
        );
        assert!(!manager.is_connected());
        assert!(manager.state().has_session());

        manager.on_transport_event(&TransportEvent::Resumed).await;
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn link_loss_fails_and_closes() {
        let (manager, transport) = manager();
        let mut events = manager.subscribe();
        manager.connect();
        next_event(&mut events).await;

        manager
            .on_transport_event(&TransportEvent::Lost {
                reason: "out of range".into(),
            })
            .await;

        assert_eq!(
            next_event(&mut events).await,
            ConnectionEvent::Failed {
                reason: "out of range".into()
            }
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn data_events_are_not_link_events() {
        let (manager, _transport) = manager();
        let handled = manager
            .on_transport_event(&TransportEvent::DataDeleted {
                path: "/weather/info".into(),
            })
            .await;
        assert!(!handled);
    }
}
