//! JSON-line output for inbound envelopes.

use mdb_core::{Notification, Response};
use serde_json::{Value, json};

/// One output line for a notification.
pub fn notification_line(notification: &Notification) -> Value {
    json!({
        "method": "notification",
        "fncname": notification.fncname,
        "fncsig": notification.fncsig,
        "arguments": notification.arguments,
    })
}

/// One output line for a response.
pub fn response_line(response: &Response) -> Value {
    json!({
        "method": "response",
        "fncname": response.fncname,
        "fncsig": response.fncsig,
        "arguments": response.arguments,
        "pass": response.pass,
    })
}

/// Parse an optional `--args`/`--pass` value.
pub fn parse_payload(flag: &str, raw: Option<&str>) -> anyhow::Result<Option<Value>> {
    use anyhow::Context;

    raw.map(|text| {
        serde_json::from_str(text).with_context(|| format!("--{flag} is not valid JSON: {text}"))
    })
    .transpose()
}
