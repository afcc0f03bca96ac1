//! Error types for edgestream.

use thiserror::Error;

use crate::message::{Status, StatusCode};

/// Main error type for connection-level operations.
#[derive(Debug, Error)]
pub enum EdgeStreamError {
    /// I/O error during pipe/socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (control plane only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (invalid frame, wrong flags, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid server configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write buffer full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using EdgeStreamError.
pub type Result<T> = std::result::Result<T, EdgeStreamError>;

/// End-of-input was reached without any control parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("missing image processing parameters")]
pub struct MissingParametersError;

/// Failure of a single streaming session.
///
/// Every variant is converted into one terminal [`Status`] on the outbound
/// stream, except [`SessionError::Cancelled`] which emits nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Inbound or outbound transport failure mid-session.
    #[error("transport error: {0}")]
    Transport(String),

    /// End-of-input with no control parameters ever observed.
    #[error("missing image processing parameters")]
    MissingParameters,

    /// The transform collaborator failed.
    #[error("processing failed: {0}")]
    Processing(String),

    /// The caller aborted or the connection went away.
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Status code reported to the caller for this failure.
    pub fn code(&self) -> StatusCode {
        match self {
            SessionError::Transport(_) => StatusCode::Unavailable,
            SessionError::MissingParameters => StatusCode::InvalidArgument,
            SessionError::Processing(_) => StatusCode::Internal,
            SessionError::Cancelled => StatusCode::Cancelled,
        }
    }

    /// Terminal status signal for this failure.
    pub fn status(&self) -> Status {
        Status::new(self.code(), self.to_string())
    }
}

impl From<MissingParametersError> for SessionError {
    fn from(_: MissingParametersError) -> Self {
        SessionError::MissingParameters
    }
}

impl From<EdgeStreamError> for SessionError {
    fn from(err: EdgeStreamError) -> Self {
        SessionError::Transport(err.to_string())
    }
}
