//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every section implements [`Default`]
//! and is `#[serde(default)]`, so partial files are accepted.

use serde::{Deserialize, Serialize};

/// Root settings type for the MusicDB client.
///
/// ```json
/// {
///   "connection": { "host": "musicdb.local", "apiKey": "..." },
///   "watchdog": { "intervalMs": 10000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdbSettings {
    /// Server endpoint and authentication.
    pub connection: ConnectionSettings,
    /// Liveness watchdog.
    pub watchdog: WatchdogSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Where and how to reach the MusicDB WebSocket server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Server host name.
    pub host: String,
    /// WebSocket port.
    pub port: u16,
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
    /// Full endpoint URL; takes precedence over host/port/secure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// API key sent with every envelope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Give up opening a connection after this many milliseconds.
    pub connect_timeout_ms: u64,
    /// Consecutive watchdog reconnects before giving up (0 = no limit).
    pub max_reconnects: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            secure: true,
            url: None,
            api_key: None,
            connect_timeout_ms: 10_000,
            max_reconnects: 3,
        }
    }
}

impl ConnectionSettings {
    /// WebSocket URL to connect to.
    pub fn endpoint(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Watchdog that reconnects when the server goes quiet.
///
/// The server sends a heartbeat every second, so the default interval
/// tolerates four missed heartbeats.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchdogSettings {
    /// Whether the watchdog runs at all.
    pub enabled: bool,
    /// Silence tolerated before reconnecting, in milliseconds.
    pub interval_ms: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `info` or `mdb_connection=debug`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
