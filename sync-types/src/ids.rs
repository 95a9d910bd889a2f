//! Identity and time types for wearsync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::WireError;

/// Identifier of a peer on the data layer (a node id).
///
/// Peer ids are opaque to wearsync; the only requirement is that they are
/// not blank.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a PeerId, rejecting blank identifiers.
    pub fn new(id: impl Into<String>) -> Result<Self, WireError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WireError::InvalidPeerId(id));
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

/// Opaque token referencing a binary asset held by the remote peer.
///
/// Tokens produced by [`AssetRef::for_content`] are the hex BLAKE3 hash of
/// the asset bytes. Tokens decoded from the wire are kept verbatim and may be
/// invalid; consumers check them with [`AssetRef::validate`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(String);

impl AssetRef {
    /// Parse a token, rejecting blank values and embedded whitespace.
    pub fn parse(token: impl Into<String>) -> Result<Self, WireError> {
        let asset = Self(token.into());
        asset.validate()?;
        Ok(asset)
    }

    /// Wrap a token without validating it.
    ///
    /// Mirrors what deserialization does with tokens arriving from a peer.
    pub fn raw(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Content-addressed reference for the given bytes.
    pub fn for_content(bytes: &[u8]) -> Self {
        Self(hex::encode(blake3::hash(bytes).as_bytes()))
    }

    /// Check that the token is usable for a fetch.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.0.trim().is_empty() || self.0.chars().any(char::is_whitespace) {
            return Err(WireError::InvalidAssetRef(self.0.clone()));
        }
        Ok(())
    }

    /// Get the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.0.chars().take(12).collect();
        write!(f, "AssetRef({})", shown)
    }
}

/// Wall-clock instant in milliseconds since the Unix epoch.
///
/// Both peers stamp records with epoch millis, so this is the unit the
/// throttle compares.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from epoch milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// The Unix epoch.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Epoch milliseconds.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Add a duration, saturating at the maximum representable instant.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
