//! In-memory data layer linking one wearable with one companion.
//!
//! [`LoopbackLink::pair`] returns both ends of a link. The wearable end
//! implements [`Transport`], the companion end [`CompanionTransport`], and a
//! [`LinkControl`] handle injects outages, suspensions and losses.
//!
//! Data items cross the link as MessagePack bytes and are decoded on the
//! wearable side; link notifications travel as-is.

use super::{CompanionTransport, InboundRequest, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use sync_types::{AssetRef, DataItem, PeerId, UpdateRequest};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What the companion side pushes towards the wearable.
#[derive(Debug)]
enum Frame {
    /// Encoded [`DataItem`].
    Item(Vec<u8>),
    /// Link notification.
    Link(TransportEvent),
}

/// Factory for linked transport pairs.
#[derive(Debug)]
pub struct LoopbackLink;

impl LoopbackLink {
    /// Create a connected pair of transports.
    pub fn pair(wearable: PeerId, companion: PeerId) -> (WearableEnd, CompanionEnd) {
        let shared = Arc::new(Shared {
            wearable,
            companion,
            assets: Mutex::new(HashMap::new()),
            items: Mutex::new(HashMap::new()),
            session_open: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
        });
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let wearable = WearableEnd {
            shared: Arc::clone(&shared),
            requests: request_tx,
            events: tokio::sync::Mutex::new(event_rx),
        };
        let companion = CompanionEnd {
            shared,
            requests: tokio::sync::Mutex::new(request_rx),
            events: event_tx,
        };
        (wearable, companion)
    }
}

#[derive(Debug)]
struct Shared {
    wearable: PeerId,
    companion: PeerId,
    assets: Mutex<HashMap<AssetRef, Vec<u8>>>,
    items: Mutex<HashMap<String, DataItem>>,
    session_open: AtomicBool,
    reachable: AtomicBool,
}

impl Shared {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn is_open(&self) -> bool {
        self.session_open.load(Ordering::SeqCst)
    }
}

/// Wearable side of a loopback link.
#[derive(Debug)]
pub struct WearableEnd {
    shared: Arc<Shared>,
    requests: mpsc::UnboundedSender<InboundRequest>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl WearableEnd {
    /// Identity of this wearable.
    pub fn local_peer(&self) -> &PeerId {
        &self.shared.wearable
    }

    /// Identity of the paired companion.
    pub fn companion_peer(&self) -> &PeerId {
        &self.shared.companion
    }
}

#[async_trait]
impl Transport for WearableEnd {
    async fn connect(&self) -> Result<(), TransportError> {
        if !self.shared.is_reachable() {
            return Err(TransportError::ConnectionFailed(
                "companion unreachable".to_string(),
            ));
        }
        self.shared.session_open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send_request(&self, request: &UpdateRequest) -> Result<(), TransportError> {
        if !self.shared.is_open() {
            return Err(TransportError::NotConnected);
        }
        if !self.shared.is_reachable() {
            return Err(TransportError::SendFailed(
                "companion unreachable".to_string(),
            ));
        }
        if request.peer != self.shared.companion {
            return Err(TransportError::SendFailed(format!(
                "unknown peer {}",
                request.peer
            )));
        }

        self.requests
            .send(InboundRequest {
                source: self.shared.wearable.clone(),
                path: request.path.clone(),
            })
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<TransportEvent, TransportError> {
        let frame = {
            let mut events = self.events.lock().await;
            events.recv().await.ok_or(TransportError::ConnectionClosed)?
        };
        match frame {
            Frame::Item(bytes) => DataItem::from_bytes(&bytes)
                .map(TransportEvent::DataChanged)
                .map_err(|e| {
                    warn!(len = bytes.len(), error = %e, "undecodable data item");
                    TransportError::ReceiveFailed(e.to_string())
                }),
            Frame::Link(event) => Ok(event),
        }
    }

    async fn fetch_asset(&self, asset: &AssetRef) -> Result<Vec<u8>, TransportError> {
        if !self.shared.is_open() {
            return Err(TransportError::NotConnected);
        }
        let assets = self
            .shared
            .assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        assets
            .get(asset)
            .cloned()
            .ok_or_else(|| TransportError::AssetNotFound(asset.as_str().to_string()))
    }

    fn is_connected(&self) -> bool {
        self.shared.is_open()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shared.session_open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Companion side of a loopback link.
#[derive(Debug)]
pub struct CompanionEnd {
    shared: Arc<Shared>,
    requests: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundRequest>>,
    events: mpsc::UnboundedSender<Frame>,
}

impl CompanionEnd {
    /// Handle for injecting link conditions.
    pub fn control(&self) -> LinkControl {
        LinkControl {
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
        }
    }

    /// Latest published item at `path`.
    pub fn published(&self, path: &str) -> Option<DataItem> {
        self.shared
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl CompanionTransport for CompanionEnd {
    fn local_peer(&self) -> &PeerId {
        &self.shared.companion
    }

    async fn recv_request(&self) -> Result<InboundRequest, TransportError> {
        let mut requests = self.requests.lock().await;
        requests.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    async fn put_asset(&self, bytes: Vec<u8>) -> Result<AssetRef, TransportError> {
        let asset = AssetRef::for_content(&bytes);
        self.shared
            .assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset.clone(), bytes);
        Ok(asset)
    }

    async fn put_data_item(&self, item: DataItem) -> Result<(), TransportError> {
        if !self.shared.is_reachable() {
            return Err(TransportError::SendFailed(
                "wearable unreachable".to_string(),
            ));
        }
        let bytes = item
            .to_bytes()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.shared
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.path.clone(), item);
        self.events
            .send(Frame::Item(bytes))
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// Injects link conditions into a loopback pair.
#[derive(Debug, Clone)]
pub struct LinkControl {
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<Frame>,
}

impl LinkControl {
    /// Make the peers reachable or unreachable.
    ///
    /// While unreachable, wearable connects fail and sends in either
    /// direction fail. Open sessions are not touched.
    pub fn set_reachable(&self, reachable: bool) {
        debug!(reachable, "loopback reachability changed");
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Suspend the wearable's session.
    pub fn suspend(&self, code: i32) {
        let _ = self.events.send(Frame::Link(TransportEvent::Suspended { code }));
    }

    /// Resume a suspended session.
    pub fn resume(&self) {
        let _ = self.events.send(Frame::Link(TransportEvent::Resumed));
    }

    /// Tear down the wearable's session.
    pub fn lose(&self, reason: &str) {
        self.shared.session_open.store(false, Ordering::SeqCst);
        let _ = self.events.send(Frame::Link(TransportEvent::Lost {
            reason: reason.to_string(),
        }));
    }

    /// Delete the item at `path`.
    pub fn delete(&self, path: &str) {
        self.shared
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        let _ = self.events.send(Frame::Link(TransportEvent::DataDeleted {
            path: path.to_string(),
        }));
    }

    /// Deliver raw bytes to the wearable as if they were an encoded item.
    pub fn inject_bytes(&self, bytes: Vec<u8>) {
        let _ = self.events.send(Frame::Item(bytes));
    }
}
