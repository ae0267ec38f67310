//! Connection configuration.

use std::time::Duration;

use mdb_settings::MdbSettings;

use crate::watchdog::DEFAULT_INTERVAL;

/// Default number of consecutive watchdog reconnects before giving up.
pub const DEFAULT_MAX_RECONNECTS: u32 = 3;

/// Default dial timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a [`Connection`](crate::Connection) needs to know up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// WebSocket URL of the server.
    pub endpoint: String,
    /// API key sent with every envelope.
    pub api_key: Option<String>,
    /// Arm the watchdog when a connection opens.
    pub watchdog_enabled: bool,
    /// Silence tolerated before the watchdog reconnects.
    pub watchdog_interval: Duration,
    /// Consecutive watchdog reconnects allowed; `None` for no limit.
    pub max_reconnects: Option<u32>,
    /// Give up opening a connection after this long.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Defaults for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            watchdog_enabled: true,
            watchdog_interval: DEFAULT_INTERVAL,
            max_reconnects: Some(DEFAULT_MAX_RECONNECTS),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &MdbSettings) -> Self {
        let conn = &settings.connection;
        Self {
            endpoint: conn.endpoint(),
            api_key: conn.api_key.clone().filter(|k| !k.is_empty()),
            watchdog_enabled: settings.watchdog.enabled,
            watchdog_interval: Duration::from_millis(settings.watchdog.interval_ms),
            max_reconnects: (conn.max_reconnects > 0).then_some(conn.max_reconnects),
            connect_timeout: Duration::from_millis(conn.connect_timeout_ms),
        }
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the watchdog interval.
    #[must_use]
    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    /// Start with the watchdog disabled.
    #[must_use]
    pub fn without_watchdog(mut self) -> Self {
        self.watchdog_enabled = false;
        self
    }

    /// Limit consecutive watchdog reconnects (`None` for no limit).
    #[must_use]
    pub fn with_max_reconnects(mut self, max: Option<u32>) -> Self {
        self.max_reconnects = max;
        self
    }

    /// Set the dial timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConnectionConfig::new("wss://localhost:9000");
        assert_eq!(config.watchdog_interval, Duration::from_secs(5));
        assert!(config.watchdog_enabled);
        assert_eq!(config.max_reconnects, Some(3));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn from_default_settings_matches_new() {
        let settings = MdbSettings::default();
        let config = ConnectionConfig::from_settings(&settings);
        assert_eq!(config, ConnectionConfig::new("wss://localhost:9000"));
    }

    #[test]
    fn zero_reconnects_means_unlimited() {
        let mut settings = MdbSettings::default();
        settings.connection.max_reconnects = 0;
        settings.connection.api_key = Some(String::new());
        settings.watchdog.interval_ms = 1500;
        let config = ConnectionConfig::from_settings(&settings);
        assert_eq!(config.max_reconnects, None);
        assert!(config.api_key.is_none());
        assert_eq!(config.watchdog_interval, Duration::from_millis(1500));
    }

    #[test]
    fn builder_methods() {
        let config = ConnectionConfig::new("ws://127.0.0.1:9000")
            .with_api_key("secret")
            .without_watchdog()
            .with_watchdog_interval(Duration::from_millis(200))
            .with_max_reconnects(None)
            .with_connect_timeout(Duration::from_secs(1));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert!(!config.watchdog_enabled);
        assert_eq!(config.watchdog_interval, Duration::from_millis(200));
        assert_eq!(config.max_reconnects, None);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
    }
}
