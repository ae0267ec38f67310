//! # mdb-core
//!
//! Shared vocabulary for the MusicDB client crates.
//!
//! - **Envelopes**: [`OutboundEnvelope`] for `call` / `request` / `broadcast`
//!   packets and [`Inbound`] for decoded notifications and responses
//! - **Codec**: [`encode`] and [`decode`] for the JSON text-frame format
//! - **Errors**: [`ProtocolError`] for encode/decode failures
//! - **Logging**: `tracing` subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod protocol;

pub use errors::{ProtocolError, Result};
pub use protocol::{
    CallMethod, Inbound, InboundEnvelope, Notification, OutboundEnvelope, Response, decode,
    encode,
};
