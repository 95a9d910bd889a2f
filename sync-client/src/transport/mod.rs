//! Transport abstraction for wearsync.
//!
//! This module provides a pluggable transport layer over the platform's
//! peer data layer (a real Bluetooth/Wi-Fi link on device, in-memory pairs
//! and mocks for testing).
//!
//! # Design
//!
//! The transport trait is async and session-oriented:
//! - `connect()` opens a session with the data layer
//! - `send_request()` delivers an update request to a peer
//! - `recv()` yields the next inbound event (data change, link change)
//! - `fetch_asset()` retrieves asset bytes by reference
//! - `close()` releases the session
//!
//! The companion side speaks [`CompanionTransport`] instead: it receives
//! requests and publishes assets and data items.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect().await?;
//! transport.send_request(&UpdateRequest::weather(peer)).await?;
//! let event = transport.recv().await?;
//! ```

mod loopback;
mod mock;

pub use loopback::{CompanionEnd, LinkControl, LoopbackLink, WearableEnd};
pub use mock::MockTransport;

use async_trait::async_trait;
use sync_types::{AssetRef, DataItem, PeerId, UpdateRequest};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed; no further events will arrive.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The data layer holds no asset with this reference.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

/// Something the data layer reported to the wearable.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A data item was created or replaced.
    DataChanged(DataItem),
    /// A data item was deleted.
    DataDeleted {
        /// Path of the deleted item.
        path: String,
    },
    /// The session was suspended by the link.
    Suspended {
        /// Platform-specific cause code.
        code: i32,
    },
    /// A suspended session resumed.
    Resumed,
    /// The session was lost.
    Lost {
        /// Why the link went away.
        reason: String,
    },
}

/// Wearable-side transport.
///
/// Implementations handle the underlying data layer. All methods may be
/// called concurrently from the engine's tick, inbound and asset tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session with the data layer.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Deliver an update request to `request.peer`.
    async fn send_request(&self, request: &UpdateRequest) -> Result<(), TransportError>;

    /// Receive the next inbound event.
    ///
    /// Blocks until an event is available. Returns
    /// [`TransportError::ConnectionClosed`] once no more events can arrive.
    async fn recv(&self) -> Result<TransportEvent, TransportError>;

    /// Retrieve the bytes behind an asset reference.
    async fn fetch_asset(&self, asset: &AssetRef) -> Result<Vec<u8>, TransportError>;

    /// Check if a session is open.
    fn is_connected(&self) -> bool;

    /// Release the session.
    async fn close(&self) -> Result<(), TransportError>;
}

/// An update request as seen by the companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Wearable that sent the request.
    pub source: PeerId,
    /// Topic path the request was sent on.
    pub path: String,
}

/// Companion-side transport.
#[async_trait]
pub trait CompanionTransport: Send + Sync {
    /// Identity of the companion on the data layer.
    fn local_peer(&self) -> &PeerId;

    /// Receive the next update request.
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the link is gone
    /// for good.
    async fn recv_request(&self) -> Result<InboundRequest, TransportError>;

    /// Store asset bytes on the data layer and return their reference.
    async fn put_asset(&self, bytes: Vec<u8>) -> Result<AssetRef, TransportError>;

    /// Publish a data item, replacing any item at the same path.
    async fn put_data_item(&self, item: DataItem) -> Result<(), TransportError>;
}
