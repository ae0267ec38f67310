//! # mdb-settings
//!
//! Configuration for the MusicDB client, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`MdbSettings::default()`]
//! 2. **User file**: `~/.musicdb/webui.json` (deep-merged over defaults)
//! 3. **Environment variables**: `MDB_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mdb_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("server: {}", settings.connection.endpoint());
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = MdbSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_match_webui() {
        let settings = MdbSettings::default();
        assert_eq!(settings.connection.port, 9000);
        assert!(settings.connection.secure);
        assert!(settings.connection.api_key.is_none());
        assert!(settings.watchdog.enabled);
        assert_eq!(settings.watchdog.interval_ms, 5000);
        assert_eq!(settings.connection.max_reconnects, 3);
        assert_eq!(settings.logging.level, "info");
    }
}
