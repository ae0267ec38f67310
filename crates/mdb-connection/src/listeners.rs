//! Listener registry for connection events.
//!
//! Six independent listener lists, one per event category. Application
//! components register on their own and receive every event of that
//! category; filtering by `fncname`/`fncsig` is the listener's job.
//!
//! Dispatch snapshots the list before invoking, so a listener may register
//! or remove listeners (or drive the connection) without deadlocking. A
//! panicking listener is logged and skipped; the rest still run.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use mdb_core::{Notification, Response};
use parking_lot::RwLock;
use tracing::warn;

use crate::errors::TransportError;

/// Receives every inbound notification.
pub type NotificationListener = Arc<dyn Fn(&Notification) + Send + Sync>;
/// Receives every inbound response.
pub type MessageListener = Arc<dyn Fn(&Response) + Send + Sync>;
/// Called once per successful open.
pub type ConnectListener = Arc<dyn Fn() + Send + Sync>;
/// Called with the close reason after a clean close.
pub type DisconnectListener = Arc<dyn Fn(&str) + Send + Sync>;
/// Called after an abnormal close, failed dial or liveness exhaustion.
pub type ErrorListener = Arc<dyn Fn(&TransportError) + Send + Sync>;
/// Called when the watchdog expires, before the automatic reconnect.
pub type WatchdogListener = Arc<dyn Fn() + Send + Sync>;

/// Event category a listener is registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Server notifications.
    Notification,
    /// Responses to requests and broadcasts.
    Message,
    /// Connection opened.
    Connect,
    /// Connection closed cleanly.
    Disconnect,
    /// Connection failed.
    Error,
    /// Watchdog expired.
    WatchdogTimeout,
}

impl ListenerKind {
    /// Name used in log output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Message => "message",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Error => "error",
            Self::WatchdogTimeout => "watchdog-timeout",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Slot<F: ?Sized> {
    entries: RwLock<Vec<(u64, Arc<F>)>>,
}

impl<F: ?Sized> Default for Slot<F> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> Slot<F> {
    fn push(&self, id: u64, listener: Arc<F>) {
        self.entries.write().push((id, listener));
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.read().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// All registered listeners of one connection.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    notification: Slot<dyn Fn(&Notification) + Send + Sync>,
    message: Slot<dyn Fn(&Response) + Send + Sync>,
    connect: Slot<dyn Fn() + Send + Sync>,
    disconnect: Slot<dyn Fn(&str) + Send + Sync>,
    error: Slot<dyn Fn(&TransportError) + Send + Sync>,
    watchdog: Slot<dyn Fn() + Send + Sync>,
}

impl Listeners {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn handle(self: &Arc<Self>, kind: ListenerKind) -> (u64, ListenerHandle) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ListenerHandle {
            kind,
            id,
            registry: Arc::downgrade(self),
        };
        (id, handle)
    }

    /// Register a notification listener.
    pub fn add_notification(self: &Arc<Self>, listener: NotificationListener) -> ListenerHandle {
        let (id, handle) = self.handle(ListenerKind::Notification);
        self.notification.push(id, listener);
        handle
    }

    /// Register a response listener.
    pub fn add_message(self: &Arc<Self>, listener: MessageListener) -> ListenerHandle {
        let (id, handle) = self.handle(ListenerKind::Message);
        self.message.push(id, listener);
        handle
    }

    /// Register a connect listener.
    pub fn add_connect(self: &Arc<Self>, listener: ConnectListener) -> ListenerHandle {
        let (id, handle) = self.handle(ListenerKind::Connect);
        self.connect.push(id, listener);
        handle
    }

    /// Register a disconnect listener.
    pub fn add_disconnect(self: &Arc<Self>, listener: DisconnectListener) -> ListenerHandle {
        let (id, handle) = self.handle(ListenerKind::Disconnect);
        self.disconnect.push(id, listener);
        handle
    }

    /// Register an error listener.
    pub fn add_error(self: &Arc<Self>, listener: ErrorListener) -> ListenerHandle {
        let (id, handle) = self.handle(ListenerKind::Error);
        self.error.push(id, listener);
        handle
    }

    /// Register a watchdog-timeout listener.
    pub fn add_watchdog(self: &Arc<Self>, listener: WatchdogListener) -> ListenerHandle {
        let (id, handle) = self.handle(ListenerKind::WatchdogTimeout);
        self.watchdog.push(id, listener);
        handle
    }

    #[cfg(test)]
    fn count(&self, kind: ListenerKind) -> usize {
        match kind {
            ListenerKind::Notification => self.notification.len(),
            ListenerKind::Message => self.message.len(),
            ListenerKind::Connect => self.connect.len(),
            ListenerKind::Disconnect => self.disconnect.len(),
            ListenerKind::Error => self.error.len(),
            ListenerKind::WatchdogTimeout => self.watchdog.len(),
        }
    }

    fn remove(&self, kind: ListenerKind, id: u64) -> bool {
        match kind {
            ListenerKind::Notification => self.notification.remove(id),
            ListenerKind::Message => self.message.remove(id),
            ListenerKind::Connect => self.connect.remove(id),
            ListenerKind::Disconnect => self.disconnect.remove(id),
            ListenerKind::Error => self.error.remove(id),
            ListenerKind::WatchdogTimeout => self.watchdog.remove(id),
        }
    }

    /// Deliver a notification to every notification listener.
    pub fn emit_notification(&self, notification: &Notification) {
        for listener in self.notification.snapshot() {
            isolate(ListenerKind::Notification, || listener(notification));
        }
    }

    /// Deliver a response to every message listener.
    pub fn emit_message(&self, response: &Response) {
        for listener in self.message.snapshot() {
            isolate(ListenerKind::Message, || listener(response));
        }
    }

    /// Notify connect listeners.
    pub fn emit_connect(&self) {
        for listener in self.connect.snapshot() {
            isolate(ListenerKind::Connect, || listener());
        }
    }

    /// Notify disconnect listeners.
    pub fn emit_disconnect(&self, reason: &str) {
        for listener in self.disconnect.snapshot() {
            isolate(ListenerKind::Disconnect, || listener(reason));
        }
    }

    /// Notify error listeners.
    pub fn emit_error(&self, error: &TransportError) {
        for listener in self.error.snapshot() {
            isolate(ListenerKind::Error, || listener(error));
        }
    }

    /// Notify watchdog-timeout listeners.
    pub fn emit_watchdog_timeout(&self) {
        for listener in self.watchdog.snapshot() {
            isolate(ListenerKind::WatchdogTimeout, || listener());
        }
    }
}

fn isolate(kind: ListenerKind, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic".to_string());
        warn!(kind = kind.as_str(), panic = %message, "listener panicked");
    }
}

/// Registration of one listener.
///
/// Dropping the handle keeps the listener registered; call
/// [`remove`](Self::remove) to deregister.
#[derive(Debug)]
pub struct ListenerHandle {
    kind: ListenerKind,
    id: u64,
    registry: Weak<Listeners>,
}

impl ListenerHandle {
    /// Category this listener was registered for.
    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// Deregister the listener. Returns `false` if it was already gone.
    pub fn remove(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.kind, self.id))
    }
}
