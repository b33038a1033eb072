//! Error types for the LUMI protocol and the MIDI transport
//!
//! Protocol errors are surfaced to the caller at construction time.
//! Transport errors are caught per endpoint by the router and only logged.

use thiserror::Error;

/// Errors raised while building or parsing LUMI commands and frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload length, device id or received frame shape is wrong
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown symbolic name for a root key, scale, mode or brightness level
    #[error("unknown {kind}: '{name}'")]
    Lookup { kind: &'static str, name: String },
}

impl ProtocolError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ProtocolError::Validation(msg.into())
    }

    pub(crate) fn lookup(kind: &'static str, name: impl Into<String>) -> Self {
        ProtocolError::Lookup {
            kind,
            name: name.into(),
        }
    }
}

/// Errors raised by a MIDI endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The endpoint is no longer present on the bus
    #[error("endpoint '{0}' is disconnected")]
    Disconnected(String),

    /// The backend refused the bytes
    #[error("send to '{endpoint}' failed: {reason}")]
    SendFailed { endpoint: String, reason: String },

    /// Opening a port or attaching a listener failed
    #[error("could not open '{endpoint}': {reason}")]
    OpenFailed { endpoint: String, reason: String },
}
