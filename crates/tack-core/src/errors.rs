//! Protocol error types.
//!
//! These errors carry the exact messages clients see in `error` frames, so
//! their `Display` output is part of the wire contract.

use thiserror::Error;

/// Errors produced while parsing or dispatching an inbound client frame.
///
/// The gateway replies to every protocol error with an `error` event whose
/// `message` field is this error's `Display` output; the connection stays
/// open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON.
    #[error("Invalid JSON format")]
    InvalidJson,

    /// The frame had no `type` field (or was not a JSON object).
    #[error("Missing event type")]
    MissingType,

    /// The frame's `type` is not one the gateway handles.
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    /// A required data field was absent or empty.
    #[error("Missing {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_wire_contract() {
        assert_eq!(ProtocolError::InvalidJson.to_string(), "Invalid JSON format");
        assert_eq!(ProtocolError::MissingType.to_string(), "Missing event type");
        assert_eq!(
            ProtocolError::UnknownType("client:nope".to_owned()).to_string(),
            "Unknown event type: client:nope"
        );
        assert_eq!(
            ProtocolError::MissingField("project_id").to_string(),
            "Missing project_id"
        );
    }
}
