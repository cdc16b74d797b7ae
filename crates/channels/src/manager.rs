use futures::StreamExt;
use riskscope_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::connector::{Connection, Connector, TransportEvent};

/// How long a close handshake may take before the connection is dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub type ChannelId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Error(String),
    Close(Option<u16>),
}

/// A channel event tagged with the channel that produced it, so events from a
/// superseded channel can be told apart and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEnvelope {
    pub channel: ChannelId,
    pub event: ChannelEvent,
}

struct ChannelHandle {
    id: ChannelId,
    endpoint: Url,
    state: watch::Receiver<ReadyState>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the single channel slot of a client.
///
/// `open` always tears the previous channel down (and waits for it) before
/// the new one starts connecting, so at most one channel is ever Connecting
/// or Open. All channel events are funnelled into one queue, in the order the
/// transport produced them.
pub struct ChannelManager {
    connector: Arc<dyn Connector>,
    events_tx: mpsc::Sender<ChannelEnvelope>,
    current: Option<ChannelHandle>,
    next_id: ChannelId,
}

impl ChannelManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<ChannelEnvelope>) {
        let (events_tx, events_rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                connector,
                events_tx,
                current: None,
                next_id: 1,
            },
            events_rx,
        )
    }

    /// Close whatever is in the slot, then start connecting to `endpoint`.
    pub async fn open(&mut self, endpoint: Url) -> ChannelId {
        self.close().await;

        let id = self.next_id;
        self.next_id += 1;

        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        info!(channel = id, endpoint = %endpoint, "Opening channel");

        let task = tokio::spawn(run_channel(
            id,
            endpoint.clone(),
            self.connector.clone(),
            self.events_tx.clone(),
            state_tx,
            outbound_rx,
            cancel_rx,
        ));

        self.current = Some(ChannelHandle {
            id,
            endpoint,
            state: state_rx,
            outbound: outbound_tx,
            cancel: cancel_tx,
            task,
        });
        id
    }

    /// Close the current channel, if any. Best-effort: failures of an
    /// already-dead channel are swallowed.
    pub async fn close(&mut self) {
        let Some(handle) = self.current.take() else {
            return;
        };

        debug!(channel = handle.id, endpoint = %handle.endpoint, "Closing channel");
        let _ = handle.cancel.send(true);
        if let Err(e) = handle.task.await {
            debug!(channel = handle.id, error = %e, "Channel task ended abnormally");
        }
    }

    /// Queue a frame on the channel `id`. Fails if `id` is no longer current.
    pub fn send(&self, id: ChannelId, frame: String) -> Result<()> {
        match &self.current {
            Some(handle) if handle.id == id => handle
                .outbound
                .send(frame)
                .map_err(|_| Error::Channel(format!("Channel {} is closed", id))),
            _ => Err(Error::Channel(format!("Channel {} is not the active channel", id))),
        }
    }

    pub fn current(&self) -> Option<ChannelId> {
        self.current.as_ref().map(|h| h.id)
    }

    pub fn is_current(&self, id: ChannelId) -> bool {
        self.current() == Some(id)
    }

    pub fn ready_state(&self) -> Option<ReadyState> {
        self.current.as_ref().map(|h| *h.state.borrow())
    }

    /// True while the slot holds a channel that is Connecting or Open.
    pub fn is_live(&self) -> bool {
        matches!(
            self.ready_state(),
            Some(ReadyState::Connecting) | Some(ReadyState::Open)
        )
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(handle) = self.current.take() {
            let _ = handle.cancel.send(true);
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Queue an event for the session loop. Returns `false` when the channel was
/// cancelled while waiting for queue space, or the queue is gone.
async fn emit(
    tx: &mpsc::Sender<ChannelEnvelope>,
    cancel_rx: &mut watch::Receiver<bool>,
    channel: ChannelId,
    event: ChannelEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancelled(cancel_rx) => false,
        sent = tx.send(ChannelEnvelope { channel, event }) => {
            if sent.is_err() {
                debug!(channel, "Event queue closed, dropping channel event");
            }
            sent.is_ok()
        }
    }
}

async fn run_channel(
    id: ChannelId,
    endpoint: Url,
    connector: Arc<dyn Connector>,
    events_tx: mpsc::Sender<ChannelEnvelope>,
    state_tx: watch::Sender<ReadyState>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let connected = tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => {
            debug!(channel = id, "Channel cancelled while connecting");
            state_tx.send_replace(ReadyState::Closed);
            return;
        }
        result = connector.connect(&endpoint) => result,
    };

    let Connection { mut sink, mut events } = match connected {
        Ok(conn) => conn,
        Err(e) => {
            warn!(channel = id, endpoint = %endpoint, error = %e, "Channel failed to open");
            state_tx.send_replace(ReadyState::Closed);
            emit(&events_tx, &mut cancel_rx, id, ChannelEvent::Error(e.to_string())).await;
            return;
        }
    };

    state_tx.send_replace(ReadyState::Open);
    let mut running = emit(&events_tx, &mut cancel_rx, id, ChannelEvent::Open).await;

    let mut outbound_open = true;
    while running {
        let event = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => {
                debug!(channel = id, "Channel closed by client");
                break;
            }
            frame = outbound_rx.recv(), if outbound_open => {
                match frame {
                    Some(frame) => match sink.send(frame).await {
                        Ok(()) => continue,
                        Err(e) => {
                            warn!(channel = id, error = %e, "Failed to send frame");
                            running = false;
                            ChannelEvent::Error(e.to_string())
                        }
                    },
                    None => {
                        outbound_open = false;
                        continue;
                    }
                }
            }
            event = events.next() => match event {
                Some(TransportEvent::Frame(text)) => ChannelEvent::Message(text),
                Some(TransportEvent::Error(reason)) => {
                    warn!(channel = id, error = %reason, "Channel transport error");
                    running = false;
                    ChannelEvent::Error(reason)
                }
                Some(TransportEvent::Closed { code }) => {
                    info!(channel = id, code = ?code, "Channel closed by peer");
                    running = false;
                    ChannelEvent::Close(code)
                }
                None => {
                    info!(channel = id, "Channel stream ended");
                    running = false;
                    ChannelEvent::Close(None)
                }
            },
        };

        if !emit(&events_tx, &mut cancel_rx, id, event).await {
            break;
        }
    }

    state_tx.send_replace(ReadyState::Closing);
    match tokio::time::timeout(CLOSE_GRACE, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(channel = id, error = %e, "Ignoring close failure"),
        Err(_) => debug!(channel = id, "Close handshake timed out"),
    }
    drop(sink);
    state_tx.send_replace(ReadyState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;
    use async_trait::async_trait;

    /// A service that never answers the connection attempt.
    struct HangingConnector;

    #[async_trait]
    impl Connector for HangingConnector {
        async fn connect(&self, _endpoint: &Url) -> Result<Connection> {
            futures::future::pending().await
        }
    }

    fn endpoint() -> Url {
        Url::parse("ws://service/ws/agent").unwrap()
    }

    #[tokio::test]
    async fn test_open_send_receive_close() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut manager, mut events) = ChannelManager::new(Arc::new(connector), 16);

        let id = manager.open(endpoint()).await;
        let mut peer = peers.next().await.unwrap();

        let opened = events.recv().await.unwrap();
        assert_eq!(opened, ChannelEnvelope { channel: id, event: ChannelEvent::Open });
        assert_eq!(manager.ready_state(), Some(ReadyState::Open));

        manager.send(id, "request".to_string()).unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("request"));

        peer.send("reply");
        peer.close(Some(1000));
        assert_eq!(events.recv().await.unwrap().event, ChannelEvent::Message("reply".to_string()));
        assert_eq!(events.recv().await.unwrap().event, ChannelEvent::Close(Some(1000)));

        manager.close().await;
        assert_eq!(manager.current(), None);
        assert!(!manager.is_live());
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_as_error_event() {
        let (connector, _peers) = MemoryConnector::new();
        connector.fail_next_connect("connection refused");
        let (mut manager, mut events) = ChannelManager::new(Arc::new(connector), 16);

        let id = manager.open(endpoint()).await;
        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.channel, id);
        match envelope.event {
            ChannelEvent::Error(reason) => assert!(reason.contains("connection refused")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_event() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut manager, mut events) = ChannelManager::new(Arc::new(connector), 16);

        manager.open(endpoint()).await;
        let peer = peers.next().await.unwrap();
        assert_eq!(events.recv().await.unwrap().event, ChannelEvent::Open);

        peer.fail("reset by peer");
        assert_eq!(
            events.recv().await.unwrap().event,
            ChannelEvent::Error("reset by peer".to_string())
        );
    }

    #[tokio::test]
    async fn test_reopen_closes_previous_channel_first() {
        let (connector, mut peers) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let (mut manager, mut events) = ChannelManager::new(connector.clone(), 16);

        let first = manager.open(endpoint()).await;
        let mut first_peer = peers.next().await.unwrap();
        assert_eq!(events.recv().await.unwrap().channel, first);

        let second = manager.open(endpoint()).await;
        assert_ne!(first, second);
        // The superseded connection was closed before the new one was made.
        assert_eq!(first_peer.recv().await, None);
        let _second_peer = peers.next().await.unwrap();
        assert_eq!(events.recv().await.unwrap().channel, second);

        assert_eq!(connector.live_connections(), 1);
        assert_eq!(connector.max_live_connections(), 1);
        assert!(manager.send(first, "late".to_string()).is_err());
        assert!(manager.send(second, "ok".to_string()).is_ok());
    }

    #[tokio::test]
    async fn test_close_without_channel_is_noop() {
        let (connector, _peers) = MemoryConnector::new();
        let (mut manager, _events) = ChannelManager::new(Arc::new(connector), 4);
        manager.close().await;
        assert_eq!(manager.ready_state(), None);
    }

    #[tokio::test]
    async fn test_close_of_dead_channel_is_swallowed() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut manager, mut events) = ChannelManager::new(Arc::new(connector), 16);

        manager.open(endpoint()).await;
        let peer = peers.next().await.unwrap();
        assert_eq!(events.recv().await.unwrap().event, ChannelEvent::Open);
        peer.close(None);
        assert_eq!(events.recv().await.unwrap().event, ChannelEvent::Close(None));

        manager.close().await;
        assert_eq!(manager.current(), None);
    }

    #[tokio::test]
    async fn test_reopen_while_connecting_cancels_the_attempt() {
        let (mut manager, mut events) = ChannelManager::new(Arc::new(HangingConnector), 16);

        let first = manager.open(endpoint()).await;
        assert_eq!(manager.ready_state(), Some(ReadyState::Connecting));

        let second = tokio::time::timeout(Duration::from_secs(1), manager.open(endpoint()))
            .await
            .expect("open must not wait for the hanging attempt");
        assert_ne!(first, second);
        assert!(manager.send(first, "late".to_string()).is_err());
        assert_eq!(manager.ready_state(), Some(ReadyState::Connecting));

        tokio::time::timeout(Duration::from_secs(1), manager.close())
            .await
            .expect("close must not wait for the hanging attempt");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), events.recv())
                .await
                .is_err(),
            "cancelled attempts emit nothing"
        );
    }
}
