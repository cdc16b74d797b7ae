//! In-process transport. Each successful `connect` hands the far end of the
//! connection to whoever holds the matching [`MemoryPeers`] receiver, which
//! makes it possible to script a service without a network.

use async_trait::async_trait;
use futures::StreamExt;
use riskscope_core::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url::Url;

use crate::connector::{Connection, Connector, FrameSink, TransportEvent};

#[derive(Default)]
struct Counters {
    live: AtomicUsize,
    max_live: AtomicUsize,
    connects: AtomicUsize,
}

pub struct MemoryConnector {
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    counters: Arc<Counters>,
    failures: Mutex<VecDeque<String>>,
}

/// Receiving side of [`MemoryConnector::new`]: yields one peer per connection.
pub struct MemoryPeers {
    rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryPeers {
    pub async fn next(&mut self) -> Option<MemoryPeer> {
        self.rx.recv().await
    }
}

/// The service end of one in-memory connection.
pub struct MemoryPeer {
    pub endpoint: Url,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    /// Next frame the client sent, or `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub fn send(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Frame(frame.into()));
    }

    pub fn close(&self, code: Option<u16>) {
        let _ = self.to_client.send(TransportEvent::Closed { code });
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Error(reason.into()));
    }
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryPeers) {
        let (peers_tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers_tx,
                counters: Arc::new(Counters::default()),
                failures: Mutex::new(VecDeque::new()),
            },
            MemoryPeers { rx },
        )
    }

    /// Make the next `connect` call fail with `reason`.
    pub fn fail_next_connect(&self, reason: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(reason.into());
        }
    }

    /// Connections whose client side has not been closed or dropped yet.
    pub fn live_connections(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live connections ever observed.
    pub fn max_live_connections(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Connection> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        let failure = self.failures.lock().ok().and_then(|mut f| f.pop_front());
        if let Some(reason) = failure {
            return Err(Error::Channel(reason));
        }

        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            endpoint: endpoint.clone(),
            from_client,
            to_client,
        };
        self.peers_tx
            .send(peer)
            .map_err(|_| Error::Channel("No peer listener for in-memory connection".to_string()))?;

        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);

        let events = futures::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();

        Ok(Connection {
            sink: Box::new(MemorySink {
                tx: Some(client_tx),
                counters: self.counters.clone(),
            }),
            events,
        })
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
    counters: Arc<Counters>,
}

impl MemorySink {
    fn release(&mut self) {
        if self.tx.take().is_some() {
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| Error::Channel("Peer went away".to_string())),
            None => Err(Error::Channel("Connection already closed".to_string())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut peers) = MemoryConnector::new();
        let endpoint = Url::parse("ws://service/ws/agent").unwrap();
        let mut conn = connector.connect(&endpoint).await.unwrap();
        let mut peer = peers.next().await.unwrap();
        assert_eq!(peer.endpoint, endpoint);

        conn.sink.send("hello".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("hello"));

        peer.send("world");
        peer.close(Some(1000));
        assert_eq!(
            conn.events.next().await,
            Some(TransportEvent::Frame("world".to_string()))
        );
        assert_eq!(
            conn.events.next().await,
            Some(TransportEvent::Closed { code: Some(1000) })
        );
    }

    #[tokio::test]
    async fn test_live_count_tracks_close_and_drop() {
        let (connector, _peers) = MemoryConnector::new();
        let endpoint = Url::parse("ws://service/ws/agent").unwrap();

        let mut first = connector.connect(&endpoint).await.unwrap();
        assert_eq!(connector.live_connections(), 1);
        first.sink.close().await.unwrap();
        assert_eq!(connector.live_connections(), 0);

        let second = connector.connect(&endpoint).await.unwrap();
        assert_eq!(connector.live_connections(), 1);
        drop(second);
        assert_eq!(connector.live_connections(), 0);
        assert_eq!(connector.max_live_connections(), 1);
    }

    #[tokio::test]
    async fn test_scripted_connect_failure() {
        let (connector, _peers) = MemoryConnector::new();
        connector.fail_next_connect("connection refused");
        let endpoint = Url::parse("ws://service/ws/agent").unwrap();
        assert!(connector.connect(&endpoint).await.is_err());
        assert!(connector.connect(&endpoint).await.is_ok());
        assert_eq!(connector.connect_count(), 2);
    }
}
