//! Mock transport for testing.
//!
//! Allows queueing inbound events, serving assets and capturing sent
//! requests for verification.

use super::{Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_types::{AssetRef, UpdateRequest};
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// Allows queueing inbound events and capturing sent requests for
/// verification. Clones share state.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    arrivals: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connect_calls: usize,
    close_calls: usize,
    fetch_calls: usize,
    sent_requests: Vec<UpdateRequest>,
    receive_queue: VecDeque<TransportEvent>,
    stream_closed: bool,
    assets: HashMap<AssetRef, Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_fetch: Option<String>,
    hang_connect: bool,
    hang_fetch: bool,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an event to be returned by the next `recv()` call.
    pub fn queue_event(&self, event: TransportEvent) {
        let mut inner = self.lock();
        inner.receive_queue.push_back(event);
        drop(inner);
        self.arrivals.notify_one();
    }

    /// End the inbound stream; `recv()` drains the queue, then reports
    /// `ConnectionClosed`.
    pub fn close_stream(&self) {
        self.lock().stream_closed = true;
        self.arrivals.notify_waiters();
        self.arrivals.notify_one();
    }

    /// Serve `bytes` for `asset` from `fetch_asset()`.
    pub fn insert_asset(&self, asset: AssetRef, bytes: Vec<u8>) {
        let mut inner = self.lock();
        inner.assets.insert(asset, bytes);
    }

    /// Get all requests that were sent.
    pub fn sent_requests(&self) -> Vec<UpdateRequest> {
        let inner = self.lock();
        inner.sent_requests.clone()
    }

    /// Get the last request that was sent.
    pub fn last_sent(&self) -> Option<UpdateRequest> {
        let inner = self.lock();
        inner.sent_requests.last().cloned()
    }

    /// Number of `connect()` calls, successful or not.
    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    /// Number of `close()` calls.
    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Number of `fetch_asset()` calls, successful or not.
    pub fn fetch_calls(&self) -> usize {
        self.lock().fetch_calls
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.lock();
        inner.fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send_request() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.lock();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the next fetch_asset() to fail with the given error.
    pub fn fail_next_fetch(&self, error: &str) {
        let mut inner = self.lock();
        inner.fail_next_fetch = Some(error.to_string());
    }

    /// Make connect() never complete.
    pub fn hang_connect(&self, hang: bool) {
        self.lock().hang_connect = hang;
    }

    /// Make fetch_asset() never complete.
    pub fn hang_fetch(&self, hang: bool) {
        self.lock().hang_fetch = hang;
    }

    /// Drop the session as if the link went away, without a `close()` call.
    pub fn drop_session(&self) {
        self.lock().connected = false;
    }

    /// Clear all state (requests, queue, assets, connection).
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            arrivals: Arc::clone(&self.arrivals),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let hang = {
            let mut inner = self.lock();
            inner.connect_calls += 1;

            // Check for forced failure
            if let Some(error) = inner.fail_next_connect.take() {
                return Err(TransportError::ConnectionFailed(error));
            }

            if !inner.hang_connect {
                inner.connected = true;
            }
            inner.hang_connect
        };

        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn send_request(&self, request: &UpdateRequest) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_requests.push(request.clone());
        Ok(())
    }

    async fn recv(&self) -> Result<TransportEvent, TransportError> {
        loop {
            {
                let mut inner = self.lock();
                if let Some(event) = inner.receive_queue.pop_front() {
                    return Ok(event);
                }
                if inner.stream_closed {
                    return Err(TransportError::ConnectionClosed);
                }
            }
            self.arrivals.notified().await;
        }
    }

    async fn fetch_asset(&self, asset: &AssetRef) -> Result<Vec<u8>, TransportError> {
        let result = {
            let mut inner = self.lock();
            inner.fetch_calls += 1;

            if !inner.connected {
                return Err(TransportError::NotConnected);
            }

            if let Some(error) = inner.fail_next_fetch.take() {
                return Err(TransportError::ReceiveFailed(error));
            }

            if inner.hang_fetch {
                None
            } else {
                Some(
                    inner
                        .assets
                        .get(asset)
                        .cloned()
                        .ok_or_else(|| TransportError::AssetNotFound(asset.as_str().to_string())),
                )
            }
        };

        match result {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    fn is_connected(&self) -> bool {
        let inner = self.lock();
        inner.connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.close_calls += 1;
        inner.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{DataItem, IncomingRecord, PeerId};

    fn companion() -> PeerId {
        PeerId::new("companion").unwrap()
    }

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_connects() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect().await.unwrap();

        assert!(transport.is_connected());
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn mock_transport_records_requests() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();

        transport
            .send_request(&UpdateRequest::weather(companion()))
            .await
            .unwrap();

        let sent = transport.sent_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].peer, companion());
        assert_eq!(sent[0].path, "/weather/require");
        assert_eq!(transport.last_sent(), Some(sent[0].clone()));
    }

    #[tokio::test]
    async fn mock_transport_receives_queued_events() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();

        let item = DataItem::weather(companion(), IncomingRecord::new());
        transport.queue_event(TransportEvent::DataChanged(item.clone()));
        transport.queue_event(TransportEvent::Resumed);

        assert_eq!(
            transport.recv().await.unwrap(),
            TransportEvent::DataChanged(item)
        );
        assert_eq!(transport.recv().await.unwrap(), TransportEvent::Resumed);
    }

    #[tokio::test(start_paused = true)]
    async fn recv_waits_on_empty_queue() {
        let transport = MockTransport::new();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(60),
            transport.recv(),
        )
        .await;
        assert!(result.is_err());

        let waiting = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.recv().await })
        };
        tokio::task::yield_now().await;
        transport.queue_event(TransportEvent::Resumed);

        assert_eq!(waiting.await.unwrap(), Ok(TransportEvent::Resumed));
    }

    #[tokio::test]
    async fn closed_stream_drains_then_ends() {
        let transport = MockTransport::new();
        transport.queue_event(TransportEvent::Resumed);

        let waiting = {
            let transport = transport.clone();
            tokio::spawn(async move {
                let first = transport.recv().await;
                let second = transport.recv().await;
                (first, second)
            })
        };
        transport.close_stream();

        let (first, second) = waiting.await.unwrap();
        assert_eq!(first, Ok(TransportEvent::Resumed));
        assert_eq!(second, Err(TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn mock_transport_serves_assets() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();
        let asset = AssetRef::for_content(b"icon");
        transport.insert_asset(asset.clone(), b"icon".to_vec());

        assert_eq!(transport.fetch_asset(&asset).await.unwrap(), b"icon");
        let missing = AssetRef::for_content(b"other");
        assert!(matches!(
            transport.fetch_asset(&missing).await,
            Err(TransportError::AssetNotFound(_))
        ));
        assert_eq!(transport.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn mock_transport_closes() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert_eq!(transport.close_calls(), 1);
    }

    // ===========================================
    // Error Condition Tests
    // ===========================================

    #[tokio::test]
    async fn send_without_connect_fails() {
        let transport = MockTransport::new();

        let result = transport
            .send_request(&UpdateRequest::weather(companion()))
            .await;
        assert_eq!(result, Err(TransportError::NotConnected));
        assert!(transport.sent_requests().is_empty());
    }

    #[tokio::test]
    async fn forced_connect_failure() {
        let transport = MockTransport::new();
        transport.fail_next_connect("radio off");

        let result = transport.connect().await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(!transport.is_connected());

        transport.connect().await.unwrap();
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn forced_send_failure_is_one_shot() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();
        transport.fail_next_send("peer unreachable");

        let request = UpdateRequest::weather(companion());
        assert!(matches!(
            transport.send_request(&request).await,
            Err(TransportError::SendFailed(_))
        ));
        transport.send_request(&request).await.unwrap();
        assert_eq!(transport.sent_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_never_completes() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();
        transport.hang_fetch(true);

        let asset = AssetRef::for_content(b"icon");
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(100),
            transport.fetch_asset(&asset),
        )
        .await;
        assert!(result.is_err());
    }

    // ===========================================
    // Clone and Shared State Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_clone_shares_state() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1.connect().await.unwrap();
        assert!(transport2.is_connected());

        transport2.drop_session();
        assert!(!transport1.is_connected());
    }

    #[tokio::test]
    async fn mock_transport_reset_clears_all() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();
        transport
            .send_request(&UpdateRequest::weather(companion()))
            .await
            .unwrap();
        transport.queue_event(TransportEvent::Resumed);

        transport.reset();

        assert!(!transport.is_connected());
        assert!(transport.sent_requests().is_empty());
        assert_eq!(transport.connect_calls(), 0);
    }
}
