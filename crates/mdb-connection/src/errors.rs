//! Transport error types.

use thiserror::Error;

/// Why a connection attempt failed or stopped being usable.
///
/// Delivered to error listeners; never returned from the public
/// [`Connection`](crate::Connection) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The endpoint could not be reached or refused the handshake.
    #[error("failed to connect to {endpoint}: {reason}")]
    Dial {
        /// URL that was dialed.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// The handshake did not complete in time.
    #[error("connecting to {endpoint} timed out after {timeout_ms}ms")]
    DialTimeout {
        /// URL that was dialed.
        endpoint: String,
        /// Configured dial timeout.
        timeout_ms: u64,
    },

    /// The peer closed with a non-normal close code.
    #[error("connection closed abnormally (code {code}): {reason}")]
    AbnormalClose {
        /// WebSocket close code.
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },

    /// Read or write failed on an open connection.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The peer did not accept queued frames and the close frame in time.
    #[error("close handshake timed out after {timeout_ms}ms")]
    CloseTimeout {
        /// Configured close timeout.
        timeout_ms: u64,
    },

    /// The stream ended without a close frame.
    #[error("connection dropped without close frame")]
    Dropped,

    /// The watchdog kept expiring and the reconnect budget ran out.
    #[error("server unresponsive after {attempts} reconnect attempts")]
    LivenessExhausted {
        /// Reconnects attempted before giving up.
        attempts: u32,
    },
}
