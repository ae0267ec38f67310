//! The resilient connection.
//!
//! A [`Connection`] owns one [`Transport`], one [`Watchdog`] and one
//! listener registry. Lifecycle changes are applied by a single driver
//! task, so transport events, watchdog expiries and connect/disconnect
//! requests are handled one at a time, in arrival order:
//!
//! ```text
//!   commands ─┐
//!   events   ─┼─▶ driver ─▶ state, watchdog, listeners
//!   expiries ─┘
//! ```
//!
//! Sending does not go through the driver: [`Connection::call`] and friends
//! encode on the caller's thread and queue the frame directly, so the result
//! is known synchronously.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mdb_core::{Notification, OutboundEnvelope, Response};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::dispatcher::Dispatcher;
use crate::errors::TransportError;
use crate::listeners::{ListenerHandle, Listeners};
use crate::timer::TokioTimer;
use crate::transport::{Dialer, Transport, TransportEvent, WebSocketDialer};
use crate::watchdog::{Watchdog, WatchdogState};

/// Lifecycle state of a [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Dialing.
    Connecting,
    /// Open; envelopes can be sent.
    Connected,
    /// A local disconnect is in progress.
    Closing,
    /// Closed cleanly.
    Disconnected,
    /// Failed; error listeners have been told why.
    Failed,
}

impl ConnectionState {
    /// Short lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
enum Command {
    Connect(Option<String>),
    Disconnect,
    EnableWatchdog(Option<Duration>),
    DisableWatchdog,
}

struct Inner {
    transport: Arc<Transport>,
    dispatcher: Arc<Dispatcher>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    watchdog: watch::Receiver<WatchdogState>,
}

/// Handle to one logical connection to a MusicDB server.
///
/// Cheap to clone; all clones share the same connection. The driver task
/// stops and the link is closed once the last clone is dropped. A listener
/// that captures a clone keeps the connection alive for as long as it stays
/// registered.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a connection that dials real WebSocket endpoints.
    ///
    /// Must be called from within a tokio runtime. Does not connect yet.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_dialer(config, Arc::new(WebSocketDialer::new()))
    }

    /// Create a connection that opens links through `dialer`.
    pub fn with_dialer(config: ConnectionConfig, dialer: Arc<dyn Dialer>) -> Self {
        let (transport, events) = Transport::new(dialer, config.connect_timeout);
        let transport = Arc::new(transport);
        let dispatcher = Arc::new(Dispatcher::new(Listeners::new(), config.api_key.clone()));

        let (expiry_tx, expiries) = mpsc::unbounded_channel();
        let watchdog = Watchdog::new(
            Box::new(TokioTimer::new()),
            config.watchdog_interval,
            Arc::new(move |generation: u64| {
                let _ = expiry_tx.send(generation);
            }),
        );
        let watchdog_rx = watchdog.subscribe();

        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            endpoint: config.endpoint,
            transport: Arc::clone(&transport),
            dispatcher: Arc::clone(&dispatcher),
            watchdog,
            watchdog_wanted: config.watchdog_enabled,
            max_reconnects: config.max_reconnects,
            reconnects: 0,
            active: None,
            state: state_tx,
        };
        drop(tokio::spawn(driver.run(commands_rx, events, expiries)));

        Self {
            inner: Arc::new(Inner {
                transport,
                dispatcher,
                commands,
                state: state_rx,
                watchdog: watchdog_rx,
            }),
        }
    }

    fn command(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            debug!("connection driver stopped, command ignored");
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open a link to the configured endpoint, closing any existing one.
    ///
    /// The outcome is reported to connect, disconnect or error listeners.
    pub fn connect(&self) {
        self.command(Command::Connect(None));
    }

    /// Open a link to `endpoint`, which becomes the endpoint for later
    /// connects and automatic reconnects.
    pub fn connect_to(&self, endpoint: impl Into<String>) {
        self.command(Command::Connect(Some(endpoint.into())));
    }

    /// Close the current link gracefully. No-op without one.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Whether envelopes can currently be sent.
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_open()
    }

    // ── Sending ─────────────────────────────────────────────────────

    /// Send a fire-and-forget call. `false` if not connected.
    pub fn call(&self, fncname: &str, arguments: Option<Value>) -> bool {
        self.send(OutboundEnvelope::call(fncname, arguments))
    }

    /// Send a request; the response goes to message listeners.
    pub fn request(
        &self,
        fncname: &str,
        fncsig: &str,
        arguments: Option<Value>,
        pass: Option<Value>,
    ) -> bool {
        self.send(OutboundEnvelope::request(fncname, fncsig, arguments, pass))
    }

    /// Send a request whose response the server delivers to all clients.
    pub fn broadcast(
        &self,
        fncname: &str,
        fncsig: &str,
        arguments: Option<Value>,
        pass: Option<Value>,
    ) -> bool {
        self.send(OutboundEnvelope::broadcast(fncname, fncsig, arguments, pass))
    }

    fn send(&self, envelope: OutboundEnvelope) -> bool {
        if !self.inner.transport.is_open() {
            debug!(fncname = %envelope.fncname, "not connected, envelope not sent");
            return false;
        }
        let Some(text) = self.inner.dispatcher.prepare(envelope) else {
            return false;
        };
        self.inner.transport.send(text)
    }

    /// Replace the API key attached to outgoing envelopes.
    pub fn set_api_key(&self, key: Option<String>) {
        self.inner.dispatcher.set_api_key(key);
    }

    /// Current API key.
    pub fn api_key(&self) -> Option<String> {
        self.inner.dispatcher.api_key()
    }

    // ── Watchdog ────────────────────────────────────────────────────

    /// Turn the watchdog on, optionally with a new interval.
    ///
    /// Armed immediately while connected, otherwise when the next link opens.
    pub fn enable_watchdog(&self, interval: Option<Duration>) {
        self.command(Command::EnableWatchdog(interval));
    }

    /// Turn the watchdog off until [`enable_watchdog`](Self::enable_watchdog)
    /// is called again; it stays off across reconnects.
    pub fn disable_watchdog(&self) {
        self.command(Command::DisableWatchdog);
    }

    /// Current watchdog state.
    pub fn watchdog_state(&self) -> WatchdogState {
        *self.inner.watchdog.borrow()
    }

    /// Observe watchdog state changes.
    pub fn watch_watchdog(&self) -> watch::Receiver<WatchdogState> {
        self.inner.watchdog.clone()
    }

    // ── Listeners ───────────────────────────────────────────────────

    fn listeners(&self) -> &Arc<Listeners> {
        self.inner.dispatcher.listeners()
    }

    /// Receive every server notification.
    pub fn add_notification_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.listeners().add_notification(Arc::new(listener))
    }

    /// Receive every response to any request or broadcast.
    pub fn add_message_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.listeners().add_message(Arc::new(listener))
    }

    /// Called each time a link opens.
    pub fn add_connect_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners().add_connect(Arc::new(listener))
    }

    /// Called with the reason each time a link closes cleanly.
    pub fn add_disconnect_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners().add_disconnect(Arc::new(listener))
    }

    /// Called each time a link fails.
    pub fn add_error_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.listeners().add_error(Arc::new(listener))
    }

    /// Called when the watchdog expires, before the automatic reconnect.
    pub fn add_watchdog_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners().add_watchdog(Arc::new(listener))
    }
}

struct Driver {
    endpoint: String,
    transport: Arc<Transport>,
    dispatcher: Arc<Dispatcher>,
    watchdog: Watchdog,
    watchdog_wanted: bool,
    max_reconnects: Option<u32>,
    reconnects: u32,
    /// Attempt whose events are still of interest.
    active: Option<u64>,
    state: watch::Sender<ConnectionState>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        mut expiries: mpsc::UnboundedReceiver<u64>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.on_event(event),
                Some(generation) = expiries.recv() => self.on_expiry(generation),
            }
        }
        debug!("connection dropped, stopping driver");
        self.watchdog.disable();
        let _ = self.transport.disconnect();
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = previous.as_str(), to = state.as_str(), "connection state changed");
        }
    }

    fn listeners(&self) -> &Listeners {
        self.dispatcher.listeners()
    }

    fn open_link(&mut self) {
        self.watchdog.disable();
        self.set_state(ConnectionState::Connecting);
        self.active = Some(self.transport.connect(&self.endpoint));
    }

    fn on_command(&mut self, command: Command) {
        trace!(?command, "command");
        match command {
            Command::Connect(endpoint) => {
                if let Some(endpoint) = endpoint {
                    self.endpoint = endpoint;
                }
                self.reconnects = 0;
                self.open_link();
            }
            Command::Disconnect => {
                self.watchdog.disable();
                if self.active.is_some() && self.transport.disconnect() {
                    self.set_state(ConnectionState::Closing);
                }
            }
            Command::EnableWatchdog(interval) => {
                self.watchdog_wanted = true;
                if let Some(interval) = interval {
                    self.watchdog.set_interval(interval);
                }
                if *self.state.borrow() == ConnectionState::Connected {
                    self.watchdog.enable(None);
                }
                info!(interval_ms = millis(self.watchdog.interval()), "watchdog enabled");
            }
            Command::DisableWatchdog => {
                self.watchdog_wanted = false;
                self.watchdog.disable();
                info!("watchdog disabled");
            }
        }
    }

    fn on_event(&mut self, event: TransportEvent) {
        let attempt = event.attempt();
        if self.active != Some(attempt) {
            trace!(attempt, "ignoring event from superseded attempt");
            return;
        }

        match event {
            TransportEvent::Opened { .. } => {
                self.set_state(ConnectionState::Connected);
                if self.watchdog_wanted {
                    self.watchdog.enable(None);
                }
                self.listeners().emit_connect();
            }
            TransportEvent::Frame { text, .. } => {
                let Some(inbound) = self.dispatcher.decode(&text) else {
                    return;
                };
                let _ = self.watchdog.reset();
                self.reconnects = 0;
                self.dispatcher.route(&inbound);
            }
            TransportEvent::Closed { reason, .. } => {
                self.end_attempt(attempt, ConnectionState::Disconnected);
                self.listeners().emit_disconnect(&reason);
            }
            TransportEvent::Failed { error, .. } => {
                self.end_attempt(attempt, ConnectionState::Failed);
                self.listeners().emit_error(&error);
            }
        }
    }

    fn end_attempt(&mut self, attempt: u64, state: ConnectionState) {
        self.watchdog.disable();
        self.transport.release(attempt);
        self.active = None;
        self.set_state(state);
    }

    fn on_expiry(&mut self, generation: u64) {
        if !self.watchdog.expire(generation) {
            return;
        }
        warn!(
            interval_ms = millis(self.watchdog.interval()),
            "no traffic from server, watchdog expired"
        );
        self.listeners().emit_watchdog_timeout();

        if let Some(max) = self.max_reconnects {
            if self.reconnects >= max {
                self.give_up(max);
                return;
            }
        }
        self.reconnects += 1;
        info!(attempt = self.reconnects, "reconnecting after watchdog timeout");
        self.open_link();
    }

    fn give_up(&mut self, attempts: u32) {
        warn!(attempts, "reconnect budget exhausted, giving up");
        let _ = self.transport.disconnect();
        if let Some(attempt) = self.active {
            self.end_attempt(attempt, ConnectionState::Failed);
        }
        self.listeners()
            .emit_error(&TransportError::LivenessExhausted { attempts });
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
