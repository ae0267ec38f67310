//! Wire-format envelopes for the MusicDB WebSocket API.
//!
//! Every frame is one JSON object. Outbound frames always carry all six
//! keys (`method`, `fncname`, `fncsig`, `arguments`, `pass`, `key`); absent
//! values are written as `null` so the server sees a uniform shape.
//!
//! Inbound frames are either notifications (`"method": "notification"`) or
//! responses (any other or missing `method`). A response echoes the
//! `fncname`, `fncsig` and `pass` of the request that produced it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// `method` value that marks an inbound envelope as a notification.
pub const NOTIFICATION_METHOD: &str = "notification";

/// How the server should treat an outbound envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMethod {
    /// Fire-and-forget; the server sends no response.
    Call,
    /// The server answers the caller with one response.
    Request,
    /// Like `Request`, but the response goes to every connected client.
    Broadcast,
}

impl CallMethod {
    /// Wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Request => "request",
            Self::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for CallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work sent to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    /// Call, request or broadcast.
    pub method: CallMethod,
    /// Server-side function name.
    pub fncname: String,
    /// Response tag; `None` for calls.
    pub fncsig: Option<String>,
    /// Function arguments; `Null` when there are none.
    #[serde(default)]
    pub arguments: Value,
    /// Opaque data echoed back in the response; `Null` when unused.
    #[serde(default)]
    pub pass: Value,
    /// Optional API key.
    pub key: Option<String>,
}

impl OutboundEnvelope {
    /// Build a fire-and-forget call.
    pub fn call(fncname: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            method: CallMethod::Call,
            fncname: fncname.into(),
            fncsig: None,
            arguments: arguments.unwrap_or(Value::Null),
            pass: Value::Null,
            key: None,
        }
    }

    /// Build a request answered to the caller only.
    pub fn request(
        fncname: impl Into<String>,
        fncsig: impl Into<String>,
        arguments: Option<Value>,
        pass: Option<Value>,
    ) -> Self {
        Self::correlated(CallMethod::Request, fncname, fncsig, arguments, pass)
    }

    /// Build a request whose response is fanned out to all clients.
    pub fn broadcast(
        fncname: impl Into<String>,
        fncsig: impl Into<String>,
        arguments: Option<Value>,
        pass: Option<Value>,
    ) -> Self {
        Self::correlated(CallMethod::Broadcast, fncname, fncsig, arguments, pass)
    }

    fn correlated(
        method: CallMethod,
        fncname: impl Into<String>,
        fncsig: impl Into<String>,
        arguments: Option<Value>,
        pass: Option<Value>,
    ) -> Self {
        Self {
            method,
            fncname: fncname.into(),
            fncsig: Some(fncsig.into()),
            arguments: arguments.unwrap_or(Value::Null),
            pass: pass.unwrap_or(Value::Null),
            key: None,
        }
    }

    /// Attach (or clear) the API key.
    #[must_use]
    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key;
        self
    }
}

/// Raw inbound envelope as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    /// `"notification"` for unsolicited events; anything else, of any JSON
    /// type, is a response.
    #[serde(default)]
    pub method: Option<Value>,
    /// Server-side function name.
    pub fncname: String,
    /// Signature of the originating request, or the notification kind.
    #[serde(default)]
    pub fncsig: Option<String>,
    /// Payload.
    #[serde(default)]
    pub arguments: Value,
    /// Pass-through data echoed from the request.
    #[serde(default)]
    pub pass: Value,
}

impl InboundEnvelope {
    /// Whether this envelope is an unsolicited notification.
    pub fn is_notification(&self) -> bool {
        self.method.as_ref().and_then(Value::as_str) == Some(NOTIFICATION_METHOD)
    }

    /// Split into a notification or a response.
    pub fn classify(self) -> Inbound {
        if self.is_notification() {
            Inbound::Notification(Notification {
                fncname: self.fncname,
                fncsig: self.fncsig,
                arguments: self.arguments,
            })
        } else {
            Inbound::Response(Response {
                fncname: self.fncname,
                fncsig: self.fncsig,
                arguments: self.arguments,
                pass: self.pass,
            })
        }
    }
}

/// Unsolicited server event, e.g. a state change.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Event source (e.g. `MusicDB:AudioStream`).
    pub fncname: String,
    /// Event kind (e.g. `onStatusChanged`).
    pub fncsig: Option<String>,
    /// Event payload.
    pub arguments: Value,
}

impl Notification {
    /// Whether this notification carries the given name and signature.
    pub fn matches(&self, fncname: &str, fncsig: &str) -> bool {
        self.fncname == fncname && self.fncsig.as_deref() == Some(fncsig)
    }
}

/// Reply to an earlier request or broadcast.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// Function that produced the response.
    pub fncname: String,
    /// Signature given by the requester.
    pub fncsig: Option<String>,
    /// Result payload.
    pub arguments: Value,
    /// Pass-through data from the request, unchanged.
    pub pass: Value,
}

impl Response {
    /// Whether this response answers a request with the given name and signature.
    pub fn matches(&self, fncname: &str, fncsig: &str) -> bool {
        self.fncname == fncname && self.fncsig.as_deref() == Some(fncsig)
    }
}

/// A decoded inbound envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Unsolicited event.
    Notification(Notification),
    /// Reply to a request or broadcast.
    Response(Response),
}

impl Inbound {
    /// Function name of the envelope.
    pub fn fncname(&self) -> &str {
        match self {
            Self::Notification(n) => &n.fncname,
            Self::Response(r) => &r.fncname,
        }
    }

    /// Signature of the envelope, if any.
    pub fn fncsig(&self) -> Option<&str> {
        match self {
            Self::Notification(n) => n.fncsig.as_deref(),
            Self::Response(r) => r.fncsig.as_deref(),
        }
    }
}

/// Serialize an outbound envelope into a text frame.
pub fn encode(envelope: &OutboundEnvelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|source| ProtocolError::Encode {
        fncname: envelope.fncname.clone(),
        source,
    })
}

/// Parse a text frame into a notification or response.
pub fn decode(text: &str) -> Result<Inbound> {
    let envelope: InboundEnvelope = serde_json::from_str(text).map_err(ProtocolError::Decode)?;
    Ok(envelope.classify())
}
