pub mod connector;
pub mod manager;
pub mod memory;
pub mod ws;

pub use connector::{Connection, Connector, FrameSink, TransportEvent};
pub use manager::{ChannelEnvelope, ChannelEvent, ChannelId, ChannelManager, ReadyState};
pub use memory::{MemoryConnector, MemoryPeer, MemoryPeers};
pub use ws::WsConnector;
