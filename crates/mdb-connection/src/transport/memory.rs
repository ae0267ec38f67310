//! In-process transport.
//!
//! [`MemoryDialer`] hands every dialed connection to its paired
//! [`MemoryListener`], which plays the server. Frames travel over unbounded
//! channels, so tests can drive the complete connection state machine
//! without opening sockets.

use std::io;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::dialer::{Dialer, FrameSink, FrameStream};
use crate::errors::TransportError;

/// Dialer side of an in-memory endpoint.
#[derive(Clone)]
pub struct MemoryDialer {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side of an in-memory endpoint; yields one peer per dial.
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryDialer {
    /// Create a connected dialer/listener pair.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded();
        (Self { accept_tx }, MemoryListener { accept_rx })
    }
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, endpoint: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (client_tx, client_rx) = mpsc::unbounded::<Message>();
        let (server_tx, server_rx) = mpsc::unbounded::<Result<Message, WsError>>();

        let peer = MemoryPeer {
            endpoint: endpoint.to_string(),
            to_client: server_tx,
            from_client: client_rx,
        };
        self.accept_tx
            .unbounded_send(peer)
            .map_err(|_| TransportError::Dial {
                endpoint: endpoint.to_string(),
                reason: "listener closed".into(),
            })?;

        let sink = client_tx.sink_map_err(|e| WsError::Io(io::Error::new(io::ErrorKind::BrokenPipe, e)));
        Ok((Box::pin(sink), Box::pin(server_rx)))
    }
}

impl MemoryListener {
    /// Wait for the next dialed connection. `None` once every dialer is gone.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.next().await
    }
}

/// Server end of one in-memory connection.
///
/// Dropping the peer ends the client's stream without a close frame.
pub struct MemoryPeer {
    endpoint: String,
    to_client: mpsc::UnboundedSender<Result<Message, WsError>>,
    from_client: mpsc::UnboundedReceiver<Message>,
}

impl MemoryPeer {
    /// Endpoint the client dialed.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client
            .unbounded_send(Ok(Message::text(text.into())))
            .is_ok()
    }

    /// Send a close frame with the given code and reason.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.to_client
            .unbounded_send(Ok(Message::Close(Some(frame))))
            .is_ok()
    }

    /// Deliver a read error to the client.
    pub fn fail(&self, reason: &str) -> bool {
        let error = WsError::Io(io::Error::new(io::ErrorKind::ConnectionReset, reason.to_string()));
        self.to_client.unbounded_send(Err(error)).is_ok()
    }

    /// Next message from the client, or `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.from_client.next().await
    }

    /// Next text frame from the client. `None` on close or when the client
    /// side is gone; other frame types are skipped.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.recv().await? {
                Message::Text(text) => return Some(text.as_str().to_owned()),
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (dialer, mut listener) = MemoryDialer::new();
        let Ok((mut sink, mut stream)) = dialer.dial("memory://a").await else {
            panic!("in-memory dial failed");
        };
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.endpoint(), "memory://a");

        sink.send(Message::text("hello".to_string())).await.unwrap();
        assert_eq!(peer.recv_text().await.as_deref(), Some("hello"));

        assert!(peer.send_text("world"));
        let msg = stream.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::text("world".to_string()));
    }

    #[tokio::test]
    async fn dial_fails_without_listener() {
        let (dialer, listener) = MemoryDialer::new();
        drop(listener);
        let Err(err) = dialer.dial("memory://gone").await else {
            panic!("dial succeeded without listener");
        };
        assert_matches!(err, TransportError::Dial { reason, .. } if reason == "listener closed");
    }

    #[tokio::test]
    async fn dropping_peer_ends_stream() {
        let (dialer, mut listener) = MemoryDialer::new();
        let Ok((_sink, mut stream)) = dialer.dial("memory://a").await else {
            panic!("in-memory dial failed");
        };
        drop(listener.accept().await);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn close_frame_carries_code() {
        let (dialer, mut listener) = MemoryDialer::new();
        let Ok((_sink, mut stream)) = dialer.dial("memory://a").await else {
            panic!("in-memory dial failed");
        };
        let peer = listener.accept().await.unwrap();
        assert!(peer.close(4000, "going"));
        let msg = stream.next().await.unwrap().unwrap();
        assert_matches!(msg, Message::Close(Some(frame)) if u16::from(frame.code) == 4000);
    }
}
