//! Protocol error types.

use thiserror::Error;

/// Errors raised while turning envelopes into text frames and back.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An outbound envelope could not be serialized.
    #[error("failed to encode {fncname} envelope: {source}")]
    Encode {
        /// Function the envelope was addressed to.
        fncname: String,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
    /// An inbound frame was not a valid envelope.
    #[error("malformed inbound envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = ProtocolError::Decode(json_err);
        assert!(err.to_string().starts_with("malformed inbound envelope"));
    }

    #[test]
    fn encode_error_names_function() {
        let json_err = serde_json::from_str::<serde_json::Value>("").unwrap_err();
        let err = ProtocolError::Encode {
            fncname: "GetSong".into(),
            source: json_err,
        };
        assert!(err.to_string().contains("GetSong"));
    }

    #[test]
    fn decode_error_has_source() {
        use std::error::Error as _;
        let json_err = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        let err = ProtocolError::Decode(json_err);
        assert!(err.source().is_some());
    }
}
