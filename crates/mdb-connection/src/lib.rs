//! # mdb-connection
//!
//! Resilient RPC connection to a MusicDB server over WebSocket.
//!
//! - **Transport**: one live link at a time, dialed through a [`Dialer`]
//!   ([`WebSocketDialer`] for real servers, [`MemoryDialer`] for tests)
//! - **Watchdog**: reconnects when the server stays silent for longer than
//!   the configured interval, up to a reconnect budget
//! - **Dispatcher**: `call` / `request` / `broadcast` out; notifications and
//!   responses in, fanned out to every registered listener
//!
//! ```no_run
//! use mdb_connection::{Connection, ConnectionConfig};
//!
//! # async fn demo() {
//! let conn = Connection::new(ConnectionConfig::new("wss://localhost:9000"));
//! let _ = conn.add_message_listener(|response| {
//!     if response.matches("GetSong", "ShowSong") {
//!         println!("{}", response.arguments);
//!     }
//! });
//! let _ = conn.add_connect_listener({
//!     let conn = conn.clone();
//!     move || {
//!         let _ = conn.request("GetSong", "ShowSong", Some(serde_json::json!({"songid": 42})), None);
//!     }
//! });
//! conn.connect();
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod listeners;
pub mod timer;
pub mod transport;
pub mod watchdog;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState};
pub use errors::TransportError;
pub use listeners::{ListenerHandle, ListenerKind};
pub use transport::{Dialer, MemoryDialer, MemoryListener, MemoryPeer, WebSocketDialer};
pub use watchdog::WatchdogState;
