//! WebSocket framing for the Exasol protocol.
//!
//! Wraps a `tokio-tungstenite` stream behind the [`FrameTransport`] trait so
//! the request/reply layer in [`super::channel`] never touches WebSocket
//! details directly.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::TransportError;

use super::channel::FrameTransport;

/// WebSocket transport carrying one text frame per protocol message.
pub struct WebSocketTransport {
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Open a plain WebSocket connection to `ws://host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let url = format!("ws://{}:{}", host, port);
        debug!(url = %url, "opening websocket");

        let (ws_stream, _) = connect_async(&url).await?;
        Ok(Self { ws_stream })
    }
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn send_frame(&mut self, text: String) -> Result<(), TransportError> {
        self.ws_stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendError(e.to_string()))
    }

    async fn recv_frame(&mut self) -> Result<String, TransportError> {
        loop {
            let msg = self
                .ws_stream
                .next()
                .await
                .ok_or_else(|| TransportError::ReceiveError("Connection closed".to_string()))?
                .map_err(|e| TransportError::ReceiveError(e.to_string()))?;

            match msg {
                Message::Text(text) => return Ok(text),
                Message::Binary(bytes) => {
                    return String::from_utf8(bytes).map_err(|e| {
                        TransportError::ReceiveError(format!("Invalid UTF-8 frame: {}", e))
                    });
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    return Err(TransportError::ReceiveError(
                        "Connection closed by server".to_string(),
                    ));
                }
                Message::Frame(_) => {
                    return Err(TransportError::ReceiveError(
                        "Unexpected raw frame".to_string(),
                    ));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Ignore errors from closing an already-dead socket
        let _ = self.ws_stream.close(None).await;
        Ok(())
    }
}
