//! SyncEngine - the wearable side of wearsync.
//!
//! The engine holds the synchronized weather state, decides on every tick
//! whether the companion must be asked for fresh data, merges incoming
//! records and hands icon fetches to the asset worker.
//!
//! # Architecture
//!
//! ```text
//! tick ──▶ SyncEngine ──▶ ThrottleState (sync-core) ──▶ Transport::send_request
//!              ▲
//! recv ────────┘──▶ merge_record (sync-core) ──▶ asset queue ──▶ AssetResolver
//! ```
//!
//! State lives behind one mutex that is never held across an await.
//! Readers get immutable snapshots through a watch channel; every mutation
//! publishes the new state before the lock is released, so a reader never
//! sees a half-applied record.
//!
//! # Example
//!
//! ```ignore
//! let engine = Arc::new(SyncEngine::new(config, transport, SystemClock)?);
//! let tasks = engine.spawn();
//! let mut snapshots = engine.subscribe();
//! while snapshots.changed().await.is_ok() {
//!     render(&snapshots.borrow());
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sync_core::{
    merge_record, ConnectionEvent, ConnectionState, MergeDefaults, MergeReport, ThrottleDecision,
    ThrottleState, WeatherSnapshot,
};
use sync_types::{AssetRef, DataItem, PeerId, Timestamp, UpdateRequest};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::asset::{spawn_asset_worker, AssetResolver};
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::lifecycle::ConnectionManager;
use crate::transport::{Transport, TransportError, TransportEvent};

/// Engine construction errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Called outside a Tokio runtime.
    #[error("sync engine must be created inside a Tokio runtime")]
    NoRuntime,
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No usable session; a connection attempt was requested if none was
    /// running.
    NotConnected {
        /// State at the time of the tick.
        state: ConnectionState,
    },
    /// Held data is fresh.
    Fresh {
        /// Age of the held data.
        age: Duration,
    },
    /// Data is stale and a request is already outstanding.
    AwaitingResponse {
        /// When the outstanding request went out.
        since: Timestamp,
    },
    /// One update request was sent.
    Requested {
        /// Who it was sent to.
        peer: PeerId,
    },
    /// Sending failed; the next tick retries.
    SendFailed {
        /// Transport error text.
        error: String,
    },
}

pub(crate) struct EngineState {
    pub(crate) weather: WeatherSnapshot,
    pub(crate) throttle: ThrottleState,
    pub(crate) last_peer: Option<PeerId>,
}

/// Engine state plus its published snapshot.
pub(crate) struct SharedState {
    state: Mutex<EngineState>,
    published: watch::Sender<Arc<WeatherSnapshot>>,
}

impl SharedState {
    fn new(weather: WeatherSnapshot) -> Self {
        let (published, _) = watch::channel(Arc::new(weather.clone()));
        Self {
            state: Mutex::new(EngineState {
                weather,
                throttle: ThrottleState::new(),
                last_peer: None,
            }),
            published,
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Mutate the state and publish the result if the weather changed.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut state);
        self.published.send_if_modified(|current| {
            if **current == state.weather {
                return false;
            }
            *current = Arc::new(state.weather.clone());
            true
        });
        result
    }

    fn snapshot(&self) -> Arc<WeatherSnapshot> {
        Arc::clone(&self.published.borrow())
    }

    fn subscribe(&self) -> watch::Receiver<Arc<WeatherSnapshot>> {
        self.published.subscribe()
    }
}

/// The wearable sync engine.
pub struct SyncEngine<T: Transport + 'static, C: Clock> {
    config: EngineConfig,
    default_peer: PeerId,
    defaults: MergeDefaults,
    connection: ConnectionManager<T>,
    clock: C,
    shared: Arc<SharedState>,
    assets: mpsc::Sender<AssetRef>,
}

impl<T: Transport + 'static, C: Clock> SyncEngine<T, C> {
    /// Create an engine over `transport`.
    ///
    /// Starts the asset worker, so this must run inside a Tokio runtime.
    /// Nothing is connected until the first tick.
    pub fn new(config: EngineConfig, transport: Arc<T>, clock: C) -> Result<Self, EngineError> {
        config.validate()?;
        let default_peer = config.default_peer_id()?;
        tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let connection = ConnectionManager::new(transport, config.connect_timeout());
        let defaults = MergeDefaults {
            refresh_interval: config.refresh_interval(),
            theme: config.theme(),
        };
        let shared = Arc::new(SharedState::new(WeatherSnapshot::new(
            defaults.refresh_interval,
            defaults.theme,
        )));

        let (assets, queue) = mpsc::channel(config.asset_queue_depth);
        let resolver = AssetResolver::new(
            connection.clone(),
            config.asset_timeout(),
            config.thumbnail_size,
        );
        spawn_asset_worker(resolver, Arc::clone(&shared), queue);

        Ok(Self {
            config,
            default_peer,
            defaults,
            connection,
            clock,
            shared,
            assets,
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The connection lifecycle manager.
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    /// The latest snapshot. Never blocks on I/O.
    pub fn current_state(&self) -> Arc<WeatherSnapshot> {
        self.shared.snapshot()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<WeatherSnapshot>> {
        self.shared.subscribe()
    }

    /// Current throttle timestamps.
    pub fn throttle(&self) -> ThrottleState {
        self.shared.read(|state| state.throttle)
    }

    /// Peer that sent the last accepted data item.
    pub fn last_peer(&self) -> Option<PeerId> {
        self.shared.read(|state| state.last_peer.clone())
    }

    /// Run one throttle check, sending at most one update request.
    pub async fn on_tick(&self) -> TickOutcome {
        let state = self.connection.state();
        if !state.is_connected() {
            if !state.has_session() {
                self.connection.connect();
            }
            debug!(?state, "tick without session");
            return TickOutcome::NotConnected { state };
        }

        let now = self.clock.now();
        let retry = self.config.request_retry();
        let (decision, peer) = self.shared.read(|inner| {
            (
                inner
                    .throttle
                    .check(now, inner.weather.refresh_interval, retry),
                inner
                    .last_peer
                    .clone()
                    .unwrap_or_else(|| self.default_peer.clone()),
            )
        });

        match decision {
            ThrottleDecision::Fresh { age } => {
                trace!(?age, "weather data is fresh");
                TickOutcome::Fresh { age }
            }
            ThrottleDecision::AwaitingResponse { since } => {
                debug!(%since, "weather data stale, request outstanding");
                TickOutcome::AwaitingResponse { since }
            }
            ThrottleDecision::Request => self.send_request(peer, now).await,
        }
    }

    async fn send_request(&self, peer: PeerId, now: Timestamp) -> TickOutcome {
        let request = UpdateRequest::weather(peer.clone());
        match self.connection.transport().send_request(&request).await {
            Ok(()) => {
                self.shared
                    .update(|state| state.throttle.record_request_sent(now));
                info!(%peer, path = %request.path, "requested weather update");
                TickOutcome::Requested { peer }
            }
            Err(e) => {
                warn!(%peer, error = %e, "weather request failed, retrying next tick");
                TickOutcome::SendFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Merge an inbound data item.
    ///
    /// Returns `None` for items on other topics. A new icon reference is
    /// queued for the asset worker; this never waits for the fetch.
    pub fn on_incoming(&self, item: &DataItem) -> Option<MergeReport> {
        if !item.is_weather() {
            debug!(path = %item.path, "ignoring data item on unrelated topic");
            return None;
        }

        let now = self.clock.now();
        let report = self.shared.update(|state| {
            let report = merge_record(&mut state.weather, &item.record, now, &self.defaults);
            state.throttle.record_received(report.received_at);
            state.last_peer = Some(item.source.clone());
            report
        });

        for error in &report.skipped {
            warn!(peer = %item.source, %error, "skipping malformed field");
        }
        if !report.ignored.is_empty() {
            debug!(keys = ?report.ignored, "ignoring unknown fields");
        }
        if report.interval_changed {
            info!(
                interval = ?self.current_state().refresh_interval,
                "refresh interval changed"
            );
        }
        info!(
            peer = %item.source,
            applied = report.applied.len(),
            cleared = report.cleared.len(),
            received_at = %report.received_at,
            stamped = report.stamped,
            "merged weather record"
        );

        if let Some(asset) = &report.fetch {
            self.enqueue_asset(asset.clone());
        }
        Some(report)
    }

    fn enqueue_asset(&self, asset: AssetRef) {
        if let Err(e) = self.assets.try_send(asset) {
            let asset = match e {
                mpsc::error::TrySendError::Full(asset) => asset,
                mpsc::error::TrySendError::Closed(asset) => asset,
            };
            warn!(?asset, "asset queue unavailable, dropping fetch");
            self.shared.update(|state| {
                state.weather.image.abandon(&asset);
            });
        } else {
            debug!("queued condition image fetch");
        }
    }

    /// Route one transport event.
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::DataChanged(item) => {
                self.on_incoming(&item);
            }
            TransportEvent::DataDeleted { path } => {
                debug!(%path, "ignoring data item deletion");
            }
            link => {
                self.connection.on_transport_event(&link).await;
            }
        }
    }

    /// Close the session.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
    }

    /// Start the tick timer, the inbound pump and the connect listener.
    pub fn spawn(self: &Arc<Self>) -> EngineTasks {
        // Subscribe before anything can connect.
        let events = self.connection.subscribe();

        EngineTasks {
            ticker: tokio::spawn(Arc::clone(self).run_ticker()),
            inbound: tokio::spawn(Arc::clone(self).run_inbound()),
            reconnect: tokio::spawn(Arc::clone(self).run_connect_listener(events)),
        }
    }

    async fn run_ticker(self: Arc<Self>) {
        let mut timer = tokio::time::interval(self.config.tick_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            timer.tick().await;
            self.on_tick().await;
        }
    }

    async fn run_inbound(self: Arc<Self>) {
        loop {
            match self.connection.transport().recv().await {
                Ok(event) => self.handle_transport_event(event).await,
                Err(TransportError::ConnectionClosed) => {
                    info!("inbound stream closed");
                    break;
                }
                Err(e) => {
                    trace!(error = %e, "inbound receive failed");
                    tokio::time::sleep(self.config.tick_interval()).await;
                }
            }
        }
    }

    async fn run_connect_listener(self: Arc<Self>, mut events: broadcast::Receiver<ConnectionEvent>) {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Connected) => {
                    self.on_tick().await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "connection events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Handles to the engine's background tasks.
#[derive(Debug)]
pub struct EngineTasks {
    ticker: JoinHandle<()>,
    inbound: JoinHandle<()>,
    reconnect: JoinHandle<()>,
}

impl EngineTasks {
    /// Stop all background tasks.
    pub fn abort(&self) {
        self.ticker.abort();
        self.inbound.abort();
        self.reconnect.abort();
    }
}
