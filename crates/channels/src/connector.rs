use async_trait::async_trait;
use futures::stream::BoxStream;
use riskscope_core::Result;
use url::Url;

/// What the transport reports about a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame from the peer.
    Frame(String),
    /// The peer (or the network) closed the connection.
    Closed { code: Option<u16> },
    /// The transport failed; the connection is unusable afterwards.
    Error(String),
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Start a close handshake. Errors from an already-dead connection are
    /// expected and may be ignored by the caller.
    async fn close(&mut self) -> Result<()>;
}

pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub events: BoxStream<'static, TransportEvent>,
}

/// Opens message-oriented bidirectional connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Url) -> Result<Connection>;
}
