//! Messages exchanged between the wearable and its companion.
//!
//! Two shapes cross the link: [`UpdateRequest`], a payload-less nudge from
//! the wearable, and [`DataItem`], a replace-on-write record written by the
//! companion.

use serde::{Deserialize, Serialize};

use crate::{IncomingRecord, PeerId, WireError};

/// Topic the wearable sends update requests on.
pub const WEATHER_REQUIRE_PATH: &str = "/weather/require";

/// Topic the companion writes weather data items to.
pub const WEATHER_INFO_PATH: &str = "/weather/info";

fn check_path(path: &str) -> Result<(), WireError> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(WireError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Fire-and-forget request asking a peer to publish fresh data.
///
/// Carries no payload and no correlation id; whatever the peer writes back
/// is merged whenever it arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Who to ask
    pub peer: PeerId,
    /// Topic path
    pub path: String,
}

impl UpdateRequest {
    /// Create a request for an arbitrary topic.
    pub fn new(peer: PeerId, path: &str) -> Result<Self, WireError> {
        check_path(path)?;
        Ok(Self {
            peer,
            path: path.to_string(),
        })
    }

    /// Request on the weather topic.
    pub fn weather(peer: PeerId) -> Self {
        Self {
            peer,
            path: WEATHER_REQUIRE_PATH.to_string(),
        }
    }

    /// Request payload (always empty).
    pub fn payload(&self) -> &[u8] {
        &[]
    }
}

/// A structured record written to a topic by a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    /// Peer that wrote the item
    pub source: PeerId,
    /// Topic path
    pub path: String,
    /// The record
    pub record: IncomingRecord,
}

impl DataItem {
    /// Create a data item.
    pub fn new(source: PeerId, path: &str, record: IncomingRecord) -> Result<Self, WireError> {
        check_path(path)?;
        Ok(Self {
            source,
            path: path.to_string(),
            record,
        })
    }

    /// Data item on the weather topic.
    pub fn weather(source: PeerId, record: IncomingRecord) -> Self {
        Self {
            source,
            path: WEATHER_INFO_PATH.to_string(),
            record,
        }
    }

    /// True if this item belongs to the weather topic.
    pub fn is_weather(&self) -> bool {
        self.path == WEATHER_INFO_PATH
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}
