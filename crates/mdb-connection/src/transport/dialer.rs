//! Opening the underlying duplex message stream.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use crate::errors::TransportError;

/// Outbound half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Inbound half of an open connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Opens connections to an endpoint.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open one connection and return its two halves.
    async fn dial(&self, endpoint: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// Dials real WebSocket endpoints (`ws://` and `wss://`).
#[derive(Debug, Clone, Copy)]
pub struct WebSocketDialer;

impl WebSocketDialer {
    /// Create a dialer, installing the rustls crypto provider if the
    /// process has none yet.
    pub fn new() -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self
    }
}

impl Default for WebSocketDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(&self, endpoint: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (ws, response) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Dial {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        debug!(endpoint, status = %response.status(), "websocket handshake complete");
        let (sink, stream) = ws.split();
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
