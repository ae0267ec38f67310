//! Protocol dispatcher: envelope encoding, inbound classification and
//! routing to listeners.
//!
//! There is no correlation table. A response is delivered to every message
//! listener; whoever issued the request recognises it by `fncname`, `fncsig`
//! and the echoed `pass` data.

use std::sync::Arc;

use mdb_core::{Inbound, OutboundEnvelope, decode, encode};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::listeners::Listeners;

/// Encodes outbound envelopes and routes inbound ones.
pub struct Dispatcher {
    listeners: Arc<Listeners>,
    api_key: RwLock<Option<String>>,
}

impl Dispatcher {
    /// Create a dispatcher delivering to `listeners`.
    pub fn new(listeners: Arc<Listeners>, api_key: Option<String>) -> Self {
        Self {
            listeners,
            api_key: RwLock::new(api_key),
        }
    }

    /// Listener registry this dispatcher delivers to.
    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.listeners
    }

    /// Replace the API key attached to subsequent envelopes.
    pub fn set_api_key(&self, key: Option<String>) {
        *self.api_key.write() = key;
    }

    /// Current API key.
    pub fn api_key(&self) -> Option<String> {
        self.api_key.read().clone()
    }

    /// Attach the API key and serialize. `None` if encoding failed.
    pub fn prepare(&self, envelope: OutboundEnvelope) -> Option<String> {
        let envelope = envelope.with_key(self.api_key());
        match encode(&envelope) {
            Ok(text) => {
                debug!(
                    method = envelope.method.as_str(),
                    fncname = %envelope.fncname,
                    fncsig = envelope.fncsig.as_deref().unwrap_or(""),
                    "sending envelope"
                );
                Some(text)
            }
            Err(error) => {
                warn!(fncname = %envelope.fncname, %error, "failed to encode envelope");
                None
            }
        }
    }

    /// Parse one inbound text frame. Malformed frames are logged and dropped.
    pub fn decode(&self, text: &str) -> Option<Inbound> {
        match decode(text) {
            Ok(inbound) => Some(inbound),
            Err(error) => {
                warn!(%error, len = text.len(), "dropping malformed envelope");
                None
            }
        }
    }

    /// Deliver a decoded envelope to the matching listener category.
    pub fn route(&self, inbound: &Inbound) {
        trace!(
            fncname = inbound.fncname(),
            fncsig = inbound.fncsig().unwrap_or(""),
            "routing envelope"
        );
        match inbound {
            Inbound::Notification(notification) => {
                self.listeners.emit_notification(notification);
            }
            Inbound::Response(response) => self.listeners.emit_message(response),
        }
    }
}
