//! Shared helpers for connection integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mdb_connection::{
    Connection, ConnectionConfig, ConnectionState, MemoryDialer, MemoryListener, TransportError,
};
use mdb_core::{Notification, Response};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, accept_async};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One listener invocation, in the order it happened.
#[derive(Clone, Debug, PartialEq)]
pub enum Seen {
    Connect,
    Disconnect(String),
    Error(TransportError),
    WatchdogTimeout,
    Notification(Notification),
    Message(Response),
}

/// Records every listener callback of a connection.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn attach(conn: &Connection) -> Self {
        let recorder = Self::default();

        let r = recorder.clone();
        let _ = conn.add_connect_listener(move || r.push(Seen::Connect));
        let r = recorder.clone();
        let _ = conn.add_disconnect_listener(move |reason| r.push(Seen::Disconnect(reason.into())));
        let r = recorder.clone();
        let _ = conn.add_error_listener(move |error| r.push(Seen::Error(error.clone())));
        let r = recorder.clone();
        let _ = conn.add_watchdog_listener(move || r.push(Seen::WatchdogTimeout));
        let r = recorder.clone();
        let _ = conn.add_notification_listener(move |n| r.push(Seen::Notification(n.clone())));
        let r = recorder.clone();
        let _ = conn.add_message_listener(move |m| r.push(Seen::Message(m.clone())));

        recorder
    }

    fn push(&self, seen: Seen) {
        self.seen.lock().push(seen);
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Seen) -> bool) -> usize {
        self.seen.lock().iter().filter(|s| predicate(s)).count()
    }

    pub fn connects(&self) -> usize {
        self.count(|s| *s == Seen::Connect)
    }

    pub fn timeouts(&self) -> usize {
        self.count(|s| *s == Seen::WatchdogTimeout)
    }

    pub fn errors(&self) -> Vec<TransportError> {
        self.seen
            .lock()
            .iter()
            .filter_map(|s| match s {
                Seen::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<Response> {
        self.seen
            .lock()
            .iter()
            .filter_map(|s| match s {
                Seen::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .iter()
            .filter_map(|s| match s {
                Seen::Notification(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Connection over an in-memory transport.
pub fn memory_connection(config: ConnectionConfig) -> (Connection, MemoryListener) {
    let (dialer, listener) = MemoryDialer::new();
    (Connection::with_dialer(config, Arc::new(dialer)), listener)
}

/// Wait until the connection reaches `state`.
pub async fn wait_state(conn: &Connection, state: ConnectionState) {
    let mut rx = conn.watch_state();
    let reached = timeout(TIMEOUT, rx.wait_for(|s| *s == state))
        .await
        .is_ok_and(|r| r.is_ok());
    assert!(
        reached,
        "connection never reached {state}, stuck in {}",
        conn.state()
    );
}

/// Bind a loopback listener and return it with its `ws://` URL.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Accept one WebSocket client.
pub async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(TIMEOUT, listener.accept()).await.unwrap().unwrap();
    accept_async(stream).await.unwrap()
}
