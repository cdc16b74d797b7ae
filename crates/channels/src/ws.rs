//! WebSocket transport backed by tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use riskscope_core::{Error, Result};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use crate::connector::{Connection, Connector, FrameSink, TransportEvent};

type WsSink = futures::stream::SplitSink<
    WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Connection> {
        let (ws_stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| Error::Channel(format!("WebSocket connection failed: {}", e)))?;

        info!(endpoint = %endpoint, "WebSocket connected");

        let (write, read) = ws_stream.split();
        let events = read
            .filter_map(|msg| async move {
                match msg {
                    Ok(WsMessage::Text(text)) => Some(TransportEvent::Frame(text)),
                    Ok(WsMessage::Binary(data)) => Some(TransportEvent::Frame(binary_frame(data))),
                    Ok(WsMessage::Close(frame)) => Some(TransportEvent::Closed {
                        code: frame.map(|f| u16::from(f.code)),
                    }),
                    Ok(_) => None,
                    Err(e) => Some(TransportEvent::Error(format!("WebSocket error: {}", e))),
                }
            })
            .boxed();

        Ok(Connection {
            sink: Box::new(WsFrameSink { write }),
            events,
        })
    }
}

/// Binary frames are read as text; invalid UTF-8 is replaced rather than
/// dropped so the frame still reaches the decoder.
fn binary_frame(data: Vec<u8>) -> String {
    match String::from_utf8(data) {
        Ok(text) => text,
        Err(e) => {
            debug!("Binary frame is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

struct WsFrameSink {
    write: WsSink,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.write
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| Error::Channel(format!("Failed to send frame: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.write
            .close()
            .await
            .map_err(|e| Error::Channel(format!("Failed to close WebSocket: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskscope_core::{decode, Message};

    #[test]
    fn test_invalid_utf8_binary_frame_is_kept() {
        let text = binary_frame(vec![b'{', 0xff, b'}']);
        assert_eq!(text, "{\u{fffd}}");
        assert!(matches!(decode(&text), Message::RawUnparsed { .. }));
    }

    #[test]
    fn test_utf8_binary_frame_is_unchanged() {
        assert_eq!(binary_frame(b"[log] ok".to_vec()), "[log] ok");
    }
}
