//! # sync-client
//!
//! I/O layer for wearsync: keeps a wearable's weather state in step with
//! its companion phone over a peer data layer.
//!
//! ## Features
//!
//! - **Throttled requests**: asks the companion only when held data is stale
//! - **Atomic merges**: readers see whole records or nothing
//! - **Background icon fetches**: bounded by timeouts, never blocking ticks
//! - **Transport Abstraction**: pluggable data layer (loopback, mock)
//! - **Pure State Machines**: uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_client::{EngineConfig, LoopbackLink, SyncEngine, SystemClock};
//!
//! let (watch, phone) = LoopbackLink::pair(watch_id, phone_id);
//! let engine = Arc::new(SyncEngine::new(EngineConfig::default(), Arc::new(watch), SystemClock)?);
//! let tasks = engine.spawn();
//!
//! let snapshot = engine.current_state();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asset;
pub mod clock;
pub mod companion;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod transport;

pub use asset::{decode_thumbnail, AssetError, AssetResolver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use companion::{
    CompanionError, CompanionService, FixedProvider, ProviderError, WeatherProvider, WeatherReport,
};
pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, EngineTasks, SyncEngine, TickOutcome};
pub use lifecycle::ConnectionManager;
pub use transport::{
    CompanionEnd, CompanionTransport, InboundRequest, LinkControl, LoopbackLink, MockTransport,
    Transport, TransportError, TransportEvent, WearableEnd,
};
