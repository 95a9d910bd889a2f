//! Asset resolution: fetch icon bytes, decode, scale to a thumbnail.
//!
//! Fetches are bounded by a timeout in both the connect and the fetch
//! phase. Decoding runs on the blocking pool so it never stalls the tick
//! or inbound tasks.

use image::imageops::FilterType;
use std::sync::Arc;
use std::time::Duration;
use sync_core::Bitmap;
use sync_types::AssetRef;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::SharedState;
use crate::lifecycle::ConnectionManager;
use crate::transport::{Transport, TransportError};

/// Asset resolution errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The reference is malformed. This is a caller bug, not a link problem.
    #[error("invalid asset reference {0:?}")]
    InvalidReference(String),

    /// Connecting or fetching took too long.
    #[error("asset {phase} timed out after {after:?}")]
    Timeout {
        /// "connect" or "fetch".
        phase: &'static str,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// The transport could not deliver the bytes.
    #[error("asset fetch failed: {0}")]
    Fetch(#[from] TransportError),

    /// The bytes are not a decodable image.
    #[error("asset decode failed: {0}")]
    Decode(String),
}

impl AssetError {
    /// True for errors that indicate a bug rather than a flaky link.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::InvalidReference(_))
    }
}

/// Turns asset references into thumbnails.
pub struct AssetResolver<T: Transport + 'static> {
    connection: ConnectionManager<T>,
    timeout: Duration,
    thumbnail_size: u32,
}

impl<T: Transport + 'static> Clone for AssetResolver<T> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            timeout: self.timeout,
            thumbnail_size: self.thumbnail_size,
        }
    }
}

impl<T: Transport + 'static> AssetResolver<T> {
    /// Create a resolver sharing `connection`'s transport.
    pub fn new(connection: ConnectionManager<T>, timeout: Duration, thumbnail_size: u32) -> Self {
        Self {
            connection,
            timeout,
            thumbnail_size,
        }
    }

    /// Fetch and decode `asset` into a square thumbnail.
    ///
    /// If no session exists and none is being established, a temporary one
    /// is opened for this fetch and released afterwards.
    pub async fn resolve(&self, asset: &AssetRef) -> Result<Bitmap, AssetError> {
        asset
            .validate()
            .map_err(|_| AssetError::InvalidReference(asset.as_str().to_string()))?;

        let transport = self.connection.transport();
        let temporary = !transport.is_connected() && !self.manager_owns_session();
        if temporary {
            debug!(?asset, "opening temporary session for asset fetch");
            tokio::time::timeout(self.timeout, transport.connect())
                .await
                .map_err(|_| AssetError::Timeout {
                    phase: "connect",
                    after: self.timeout,
                })??;
        }

        let fetched = tokio::time::timeout(self.timeout, transport.fetch_asset(asset)).await;

        // The manager may have taken the session over while we fetched.
        if temporary && !self.manager_owns_session() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "closing temporary session failed");
            }
        }

        let bytes = fetched.map_err(|_| AssetError::Timeout {
            phase: "fetch",
            after: self.timeout,
        })??;

        let size = self.thumbnail_size;
        tokio::task::spawn_blocking(move || decode_thumbnail(&bytes, size))
            .await
            .map_err(|e| AssetError::Decode(format!("decoder task failed: {e}")))?
    }

    fn manager_owns_session(&self) -> bool {
        let state = self.connection.state();
        state.has_session() || state.is_connecting()
    }
}

/// Decode image bytes and scale them to `size`x`size` with nearest-neighbour
/// sampling.
pub fn decode_thumbnail(bytes: &[u8], size: u32) -> Result<Bitmap, AssetError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| AssetError::Decode(e.to_string()))?;
    let scaled = decoded
        .resize_exact(size, size, FilterType::Nearest)
        .to_rgba8();
    let (width, height) = scaled.dimensions();
    Bitmap::from_rgba(width, height, scaled.into_raw()).map_err(|e| AssetError::Decode(e.to_string()))
}

/// Spawn the worker that resolves queued assets and applies the results.
///
/// Assets that stopped being pending while queued are skipped. The worker
/// ends when every sender is dropped.
pub(crate) fn spawn_asset_worker<T: Transport + 'static>(
    resolver: AssetResolver<T>,
    shared: Arc<SharedState>,
    mut queue: mpsc::Receiver<AssetRef>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(asset) = queue.recv().await {
            let wanted = shared.read(|state| state.weather.image.pending() == Some(&asset));
            if !wanted {
                debug!(?asset, "skipping superseded asset");
                continue;
            }

            let result = resolver.resolve(&asset).await;
            shared.update(|state| match result {
                Ok(bitmap) => {
                    let (width, height) = (bitmap.width(), bitmap.height());
                    if state.weather.image.complete(&asset, Arc::new(bitmap)) {
                        info!(?asset, width, height, "condition image updated");
                    } else {
                        debug!(?asset, "discarding superseded asset");
                    }
                }
                Err(e) => {
                    state.weather.image.abandon(&asset);
                    if e.is_contract_violation() {
                        error!(error = %e, "asset reference rejected");
                    } else {
                        warn!(error = %e, "asset unavailable, keeping current image");
                    }
                }
            });
        }
        debug!("asset worker stopped");
    })
}
