use keel_types::ErrorFamily;
use thiserror::Error;

/// A failure carried across the wire.
///
/// The family travels as a registered byte code, the message as UTF-8.
/// Families the protocol does not register collapse to
/// [`ErrorFamily::RequestError`] on the far side.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{family}: {message}")]
pub struct RemoteError {
    pub family: ErrorFamily,
    pub message: String,
}

impl RemoteError {
    pub fn new(family: ErrorFamily, message: impl Into<String>) -> Self {
        Self {
            family,
            message: message.into(),
        }
    }
}

/// Errors raised while building a protocol definition.
///
/// These are definition-time bugs, not runtime conditions: a spec that
/// builds once builds forever.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolDefError {
    #[error("protocol defines no {0} code")]
    MissingCode(&'static str),

    #[error("codes cannot be empty")]
    EmptyCode,

    #[error("code {code:02x?} is {got} bytes, expected {expected}")]
    CodeLengthMismatch {
        code: Vec<u8>,
        got: usize,
        expected: usize,
    },

    #[error("duplicate code {0:02x?}")]
    DuplicateCode(Vec<u8>),

    #[error("duplicate error family {0}")]
    DuplicateFamily(ErrorFamily),
}

/// Runtime protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated message: have {have} bytes, need {need}")]
    Truncated { have: usize, need: usize },

    #[error("message version does not match the protocol definition")]
    VersionMismatch,

    #[error("code {0:02x?} is not defined by this protocol")]
    UnknownCode(Vec<u8>),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ProtocolError {
    /// The wire-level family this error collapses into.
    pub fn family(&self) -> ErrorFamily {
        match self {
            Self::Truncated { .. } | Self::UnknownCode(_) => ErrorFamily::RequestError,
            Self::VersionMismatch => ErrorFamily::ProtocolVersion,
            Self::ConnectionClosed => ErrorFamily::ConnectionClosed,
            Self::Timeout => ErrorFamily::Timeout,
            Self::Remote(e) => e.family,
        }
    }
}

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
