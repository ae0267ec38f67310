//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MdbSettings::default()`]
//! 2. If `~/.musicdb/webui.json` exists, deep-merge user values over defaults
//! 3. Apply `MDB_*` environment variable overrides (highest priority)
//! 4. Validate values that would make the connection unusable
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::MdbSettings;

/// Resolve the path to the settings file (`~/.musicdb/webui.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".musicdb").join("webui.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MdbSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<MdbSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<MdbSettings> {
    let parse = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(MdbSettings::default()).map_err(parse)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(parse)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `MDB_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut MdbSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` to resolve variable names.
///
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (file/default value stays)
pub fn apply_overrides_from<F>(settings: &mut MdbSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.string("MDB_HOST") {
        settings.connection.host = v;
    }
    if let Some(v) = env.u64_in("MDB_PORT", 1, 65535) {
        settings.connection.port = u16::try_from(v).unwrap_or(settings.connection.port);
    }
    if let Some(v) = env.bool("MDB_SECURE") {
        settings.connection.secure = v;
    }
    if let Some(v) = env.string("MDB_URL") {
        settings.connection.url = Some(v);
    }
    if let Some(v) = env.string("MDB_API_KEY") {
        settings.connection.api_key = Some(v);
    }
    if let Some(v) = env.u64_in("MDB_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.connection.connect_timeout_ms = v;
    }
    if let Some(v) = env.u64_in("MDB_MAX_RECONNECTS", 0, 1000) {
        settings.connection.max_reconnects =
            u32::try_from(v).unwrap_or(settings.connection.max_reconnects);
    }

    // ── Watchdog ────────────────────────────────────────────────────
    if let Some(v) = env.bool("MDB_WATCHDOG_ENABLED") {
        settings.watchdog.enabled = v;
    }
    if let Some(v) = env.u64_in("MDB_WATCHDOG_INTERVAL_MS", 100, 600_000) {
        settings.watchdog.interval_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("MDB_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn validate(settings: &MdbSettings) -> Result<()> {
    if settings.connection.port == 0 && settings.connection.url.is_none() {
        return Err(SettingsError::Invalid {
            field: "connection.port",
            reason: "must not be 0",
        });
    }
    if settings.watchdog.interval_ms == 0 {
        return Err(SettingsError::Invalid {
            field: "watchdog.intervalMs",
            reason: "must be positive",
        });
    }
    if settings.connection.connect_timeout_ms == 0 {
        return Err(SettingsError::Invalid {
            field: "connection.connectTimeoutMs",
            reason: "must be positive",
        });
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> MdbSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = MdbSettings::default();
        apply_overrides_from(&mut settings, |name| vars.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "connection": {"port": 9000, "host": "localhost"}
        });
        let source = serde_json::json!({
            "connection": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["connection"]["port"], 9090);
        assert_eq!(merged["connection"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = read_settings_file(Path::new("/nonexistent/webui.json")).unwrap();
        assert_eq!(settings.connection.port, 9000);
        assert_eq!(settings.watchdog.interval_ms, 5000);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webui.json");
        std::fs::write(
            &path,
            r#"{"connection": {"host": "musicdb.local", "apiKey": "k"}, "watchdog": {"intervalMs": 8000}}"#,
        )
        .unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.connection.host, "musicdb.local");
        assert_eq!(settings.connection.api_key.as_deref(), Some("k"));
        assert_eq!(settings.connection.port, 9000);
        assert_eq!(settings.watchdog.interval_ms, 8000);
        assert!(settings.watchdog.enabled);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webui.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(
            result.unwrap_err(),
            SettingsError::Parse { path: p, .. } if p == path
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webui.json");
        std::fs::write(&path, r#"{"watchdog": {"intervalMs": 0}}"#).unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::Invalid { field: "watchdog.intervalMs", .. })
        ));
    }

    #[test]
    fn defaults_validate() {
        assert!(validate(&MdbSettings::default()).is_ok());
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let settings = overrides(&[
            ("MDB_HOST", "10.0.0.2"),
            ("MDB_PORT", "9443"),
            ("MDB_SECURE", "off"),
            ("MDB_API_KEY", "abc"),
            ("MDB_WATCHDOG_ENABLED", "no"),
            ("MDB_WATCHDOG_INTERVAL_MS", "2500"),
            ("MDB_MAX_RECONNECTS", "0"),
            ("MDB_LOG_LEVEL", "debug"),
        ]);
        assert_eq!(settings.connection.endpoint(), "ws://10.0.0.2:9443");
        assert_eq!(settings.connection.api_key.as_deref(), Some("abc"));
        assert!(!settings.watchdog.enabled);
        assert_eq!(settings.watchdog.interval_ms, 2500);
        assert_eq!(settings.connection.max_reconnects, 0);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let settings = overrides(&[
            ("MDB_PORT", "70000"),
            ("MDB_WATCHDOG_INTERVAL_MS", "5"),
            ("MDB_SECURE", "maybe"),
            ("MDB_HOST", ""),
        ]);
        let defaults = MdbSettings::default();
        assert_eq!(settings.connection.port, defaults.connection.port);
        assert_eq!(settings.watchdog.interval_ms, defaults.watchdog.interval_ms);
        assert!(settings.connection.secure);
        assert_eq!(settings.connection.host, "localhost");
    }

    #[test]
    fn url_override() {
        let settings = overrides(&[("MDB_URL", "ws://127.0.0.1:1234")]);
        assert_eq!(settings.connection.endpoint(), "ws://127.0.0.1:1234");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool(""), None);
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("100", 100, 200), Some(100));
        assert_eq!(parse_u64_range("200", 100, 200), Some(200));
        assert_eq!(parse_u64_range("99", 100, 200), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
        assert_eq!(parse_u64_range("abc", 0, 10), None);
    }
}
