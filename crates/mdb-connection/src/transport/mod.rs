//! Transport: owns at most one live link to the server.
//!
//! Each [`Transport::connect`] starts a new *attempt*. The attempt runs in
//! its own task, which dials, pumps outbound frames and reports everything
//! that happens as [`TransportEvent`]s tagged with the attempt number.
//! Starting a new attempt shuts the previous one down; its late events still
//! arrive but carry an old attempt number, so the owner can discard them.

mod dialer;
mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub use dialer::{Dialer, FrameSink, FrameStream, WebSocketDialer};
pub use memory::{MemoryDialer, MemoryListener, MemoryPeer};

use crate::errors::TransportError;

/// Something that happened on a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Opened {
        /// Attempt number.
        attempt: u64,
    },
    /// A text frame arrived.
    Frame {
        /// Attempt number.
        attempt: u64,
        /// Raw frame payload.
        text: String,
    },
    /// The link closed cleanly, from either side.
    Closed {
        /// Attempt number.
        attempt: u64,
        /// Human-readable close reason.
        reason: String,
    },
    /// The link failed or could not be opened.
    Failed {
        /// Attempt number.
        attempt: u64,
        /// What went wrong.
        error: TransportError,
    },
}

impl TransportEvent {
    /// Attempt this event belongs to.
    pub fn attempt(&self) -> u64 {
        match self {
            Self::Opened { attempt }
            | Self::Frame { attempt, .. }
            | Self::Closed { attempt, .. }
            | Self::Failed { attempt, .. } => *attempt,
        }
    }
}

struct Link {
    attempt: u64,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl Link {
    // The link task may still mark the link open after a disconnect.
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }
}

/// Owner of the current link.
pub struct Transport {
    dialer: Arc<dyn Dialer>,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    link: Mutex<Option<Link>>,
    attempts: AtomicU64,
}

impl Transport {
    /// Create a transport and the receiver its events are delivered to.
    pub fn new(
        dialer: Arc<dyn Dialer>,
        connect_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let transport = Self {
            dialer,
            connect_timeout,
            events,
            link: Mutex::new(None),
            attempts: AtomicU64::new(0),
        };
        (transport, events_rx)
    }

    /// Start a new attempt to `endpoint`, shutting down any previous link.
    ///
    /// Returns the new attempt number. The outcome arrives as events.
    pub fn connect(&self, endpoint: &str) -> u64 {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let link = Link {
            attempt,
            outbound,
            open: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        };

        let task = LinkTask {
            dialer: Arc::clone(&self.dialer),
            endpoint: endpoint.to_string(),
            attempt,
            connect_timeout: self.connect_timeout,
            outbound: outbound_rx,
            open: Arc::clone(&link.open),
            shutdown: link.shutdown.clone(),
            events: self.events.clone(),
        };

        if let Some(previous) = self.link.lock().replace(link) {
            debug!(attempt = previous.attempt, "replacing previous link");
            previous.shutdown.cancel();
        }
        info!(endpoint, attempt, "connecting");
        drop(tokio::spawn(task.run()));
        attempt
    }

    /// Request a graceful close of the current link.
    ///
    /// Returns `false` if there is no link. The close is reported as a
    /// [`TransportEvent::Closed`] for the current attempt.
    pub fn disconnect(&self) -> bool {
        let guard = self.link.lock();
        match guard.as_ref() {
            Some(link) if !link.shutdown.is_cancelled() => {
                link.open.store(false, Ordering::SeqCst);
                link.shutdown.cancel();
                true
            }
            _ => false,
        }
    }

    /// Queue one text frame. `false` unless the link is open.
    ///
    /// Frames are written in the order they were queued.
    pub fn send(&self, text: String) -> bool {
        let guard = self.link.lock();
        match guard.as_ref() {
            Some(link) if link.is_open() => link.outbound.send(Message::text(text)).is_ok(),
            _ => false,
        }
    }

    /// Whether the current link is open.
    pub fn is_open(&self) -> bool {
        self.link.lock().as_ref().is_some_and(Link::is_open)
    }

    #[cfg(test)]
    fn current_attempt(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Forget the link for `attempt` once it has ended.
    pub fn release(&self, attempt: u64) {
        let mut guard = self.link.lock();
        if guard.as_ref().is_some_and(|link| link.attempt == attempt) {
            *guard = None;
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.shutdown.cancel();
        }
    }
}

struct LinkTask {
    dialer: Arc<dyn Dialer>,
    endpoint: String,
    attempt: u64,
    connect_timeout: Duration,
    outbound: mpsc::UnboundedReceiver<Message>,
    open: Arc<AtomicBool>,
    shutdown: CancellationToken,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl LinkTask {
    fn emit(&self, event: TransportEvent) {
        // The owner is gone; nothing left to report to.
        let _ = self.events.send(event);
    }

    fn closed(&self, reason: impl Into<String>) {
        self.open.store(false, Ordering::SeqCst);
        let reason = reason.into();
        info!(attempt = self.attempt, %reason, "connection closed");
        self.emit(TransportEvent::Closed {
            attempt: self.attempt,
            reason,
        });
    }

    fn failed(&self, error: TransportError) {
        self.open.store(false, Ordering::SeqCst);
        warn!(attempt = self.attempt, %error, "connection failed");
        self.emit(TransportEvent::Failed {
            attempt: self.attempt,
            error,
        });
    }

    /// Flush queued frames, then send the close frame. `false` when the
    /// peer does not take them within the timeout.
    async fn say_goodbye(&mut self, sink: &mut FrameSink) -> bool {
        let outbound = &mut self.outbound;
        let goodbye = async {
            // Frames queued before the disconnect still go out.
            while let Ok(message) = outbound.try_recv() {
                if sink.send(message).await.is_err() {
                    return;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        };
        tokio::time::timeout(self.connect_timeout, goodbye)
            .await
            .is_ok()
    }

    async fn close_by_client(&mut self, sink: &mut FrameSink) {
        self.open.store(false, Ordering::SeqCst);
        if self.say_goodbye(sink).await {
            self.closed("closed by client");
        } else {
            self.failed(TransportError::CloseTimeout {
                timeout_ms: millis(self.connect_timeout),
            });
        }
    }

    async fn run(mut self) {
        let dial = tokio::time::timeout(self.connect_timeout, self.dialer.dial(&self.endpoint));
        let dialed = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {
                self.closed("connect cancelled");
                return;
            }
            result = dial => result,
        };

        let (mut sink, mut stream) = match dialed {
            Ok(Ok(halves)) => halves,
            Ok(Err(error)) => {
                self.failed(error);
                return;
            }
            Err(_) => {
                self.failed(TransportError::DialTimeout {
                    endpoint: self.endpoint.clone(),
                    timeout_ms: millis(self.connect_timeout),
                });
                return;
            }
        };

        self.open.store(true, Ordering::SeqCst);
        if self.shutdown.is_cancelled() {
            self.open.store(false, Ordering::SeqCst);
            let _ = tokio::time::timeout(self.connect_timeout, sink.close()).await;
            self.closed("connect cancelled");
            return;
        }
        info!(endpoint = %self.endpoint, attempt = self.attempt, "connection open");
        self.emit(TransportEvent::Opened {
            attempt: self.attempt,
        });

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    self.close_by_client(&mut sink).await;
                    return;
                }
                Some(message) = self.outbound.recv() => {
                    let sent = tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => None,
                        result = sink.send(message) => Some(result),
                    };
                    match sent {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            self.failed(TransportError::Io(e.to_string()));
                            return;
                        }
                        None => {
                            self.close_by_client(&mut sink).await;
                            return;
                        }
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        trace!(attempt = self.attempt, len = text.as_str().len(), "frame received");
                        self.emit(TransportEvent::Frame {
                            attempt: self.attempt,
                            text: text.as_str().to_owned(),
                        });
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let _ = tokio::time::timeout(self.connect_timeout, sink.close()).await;
                        match classify_close(frame) {
                            Ok(reason) => self.closed(reason),
                            Err(error) => self.failed(error),
                        }
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.failed(TransportError::Io(e.to_string()));
                        return;
                    }
                    None => {
                        self.failed(TransportError::Dropped);
                        return;
                    }
                },
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Clean close reason, or the error for an abnormal close code.
fn classify_close(frame: Option<CloseFrame>) -> Result<String, TransportError> {
    let Some(frame) = frame else {
        return Ok("closed by server".into());
    };
    let reason = frame.reason.as_str().to_owned();
    match frame.code {
        CloseCode::Normal | CloseCode::Away => Ok(if reason.is_empty() {
            "closed by server".into()
        } else {
            reason
        }),
        code => Err(TransportError::AbnormalClose {
            code: code.into(),
            reason,
        }),
    }
}
