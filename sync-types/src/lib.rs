//! # sync-types
//!
//! Wire format types for the wearsync data layer.
//!
//! This crate provides the foundational types shared by the wearable and the
//! companion:
//! - [`PeerId`], [`AssetRef`], [`Timestamp`] - Identity and time types
//! - [`IncomingRecord`], [`FieldValue`] - Keyed records and their values
//! - [`DataItem`], [`UpdateRequest`] - What crosses the link
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod record;

pub use error::WireError;
pub use ids::{AssetRef, PeerId, Timestamp};
pub use messages::{DataItem, UpdateRequest, WEATHER_INFO_PATH, WEATHER_REQUIRE_PATH};
pub use record::{keys, FieldValue, IncomingRecord};
