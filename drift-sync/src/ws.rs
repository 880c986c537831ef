//! WebSocket connector using tokio-tungstenite.
//!
//! Frames are JSON text messages matching the [`WireMessage`] shape.
//! Protocol-level ping/pong is passed through silently — liveness is
//! handled by the transport's own heartbeat messages.

use crate::error::{TransportError, TransportResult};
use crate::transport::{Connection, Connector, MessageSink, MessageStream};
use async_trait::async_trait;
use drift_types::WireMessage;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a WebSocket connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> TransportResult<Connection> {
        let (ws, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (sink, stream) = ws.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsMessageStream { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, message: &WireMessage) -> TransportResult<()> {
        let json = serde_json::to_string(message)?;
        self.sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        // Flush so send failures surface here rather than on a later call.
        self.sink
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> TransportResult<()> {
        // Normal close code: a clean shutdown, distinct from the abnormal
        // closure peers infer from a dropped connection.
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

struct WsMessageStream {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl MessageStream for WsMessageStream {
    async fn next(&mut self) -> Option<TransportResult<WireMessage>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(
                        serde_json::from_str(&text).map_err(TransportError::Serialization),
                    );
                }
                Ok(Message::Close(_)) => return None,
                // Protocol ping/pong and binary frames are not wire
                // messages; keep reading.
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            }
        }
    }
}
