//! Error types for wearsync wire values.

use thiserror::Error;

/// Errors that can occur while building or decoding wire values.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Asset reference token is empty or malformed
    #[error("invalid asset reference: {0:?}")]
    InvalidAssetRef(String),

    /// Peer identifier is empty
    #[error("invalid peer id: {0:?}")]
    InvalidPeerId(String),

    /// Topic path does not start with '/'
    #[error("invalid topic path: {0:?}")]
    InvalidPath(String),
}
