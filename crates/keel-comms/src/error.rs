use keel_protocol::ProtocolError;
use thiserror::Error;

/// Errors from connection management.
#[derive(Debug, Error)]
pub enum CommsError {
    /// The connector could not establish a connection.
    #[error("connect failed: {0}")]
    Connect(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result alias for comms operations.
pub type CommsResult<T> = Result<T, CommsError>;
