//! Error types for the room client.

use thiserror::Error;

use crate::protocol::FrameParseError;

/// Errors that can occur when using the room client.
#[derive(Debug, Error)]
pub enum BotcError {
    /// Required connect parameters were missing or empty. Never retried.
    #[error("connection error: {0}")]
    Connection(String),

    /// An inbound payload could not be parsed or classified.
    ///
    /// The channel loop recovers from these locally; only explicit parse
    /// calls surface them.
    #[error("frame parse error: {0}")]
    FrameParse(#[from] FrameParseError),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// An id cannot be used as a single URL path segment.
    #[error("{field} {value:?} is not a valid path segment")]
    InvalidId {
        /// Which id was rejected.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A second channel was bound while another was still active.
    #[error("role conflict: {0}")]
    RoleConflict(String),

    /// No visitor identity has been persisted yet.
    #[error("visitor is not registered")]
    NotRegistered,

    /// A display name was empty after trimming.
    #[error("visitor name must not be empty")]
    InvalidName,

    /// The requested seat/role transition does not apply to the current role.
    #[error("invalid role transition: {0}")]
    InvalidTransition(String),

    /// A seat count change would leave the room outside its allowed range.
    #[error("seat count {requested} outside allowed range {min}..={max}")]
    SeatCount {
        /// The seat count that was asked for.
        requested: usize,
        /// Smallest allowed seat count.
        min: usize,
        /// Largest allowed seat count.
        max: usize,
    },

    /// The REST collaborator rejected or failed a request.
    #[error("rest error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Rest {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Human-readable failure description.
        message: String,
    },

    /// Failed to serialize or deserialize a message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotcError {
    /// Returns `true` for socket-level failures that the reconnect policy handles.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportSend(_) | Self::TransportReceive(_) | Self::TransportClosed
        )
    }
}

/// A specialized [`Result`] type for room client operations.
pub type Result<T> = std::result::Result<T, BotcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_error_formats_status_when_present() {
        let err = BotcError::Rest {
            status: Some(404),
            message: "room not found".into(),
        };
        assert_eq!(err.to_string(), "rest error (404): room not found");

        let err = BotcError::Rest {
            status: None,
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "rest error: connection refused");
    }

    #[test]
    fn only_socket_failures_are_transient() {
        assert!(BotcError::TransportClosed.is_transient());
        assert!(BotcError::TransportReceive("reset".into()).is_transient());
        assert!(!BotcError::Connection("missing room id".into()).is_transient());
        assert!(!BotcError::Timeout.is_transient());
    }
}
