//! # sync-core
//!
//! Pure logic for wearsync (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms that keep a
//! wearable in step with its companion, without any network I/O:
//! - [`state`]: connection lifecycle state machine
//! - [`throttle`]: when a refresh request is warranted
//! - [`snapshot`]: the synchronized weather state the renderer reads
//! - [`merge`]: applying inbound records to that state
//!
//! The actual I/O (transport, timers, asset fetches) is performed by
//! `sync-client`, which interprets the actions and decisions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;
pub mod snapshot;
pub mod state;
pub mod throttle;

pub use merge::{merge_record, FieldError, MergeDefaults, MergeReport};
pub use snapshot::{Bitmap, BitmapError, ConditionImage, Theme, WeatherSnapshot};
pub use state::{Action, ConnectionEvent, ConnectionState, Event};
pub use throttle::{ThrottleDecision, ThrottleState};
