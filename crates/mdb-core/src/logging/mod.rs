//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the global stderr subscriber for binaries,
//!   compact or JSON
//! - [`capture_logs`] records events in memory so tests can assert on them
//!
//! Connection components attach context as event fields (`fncname`,
//! `fncsig`, `attempt`, `endpoint`) rather than formatting it into messages.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Output format of the stderr subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per event, fields flattened.
    Json,
}

/// Install the global stderr subscriber.
///
/// `RUST_LOG` takes precedence over `level` (e.g. `"info"` or
/// `"mdb_connection=debug"`). Only the first call in a process has an effect.
pub fn init_subscriber(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // try_init fails if a global subscriber is already installed
    let _ = match format {
        LogFormat::Compact => builder.compact().with_target(true).try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
}
