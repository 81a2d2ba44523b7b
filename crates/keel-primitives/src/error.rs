use thiserror::Error;

/// Errors from primitive packing and parsing.
#[derive(Debug, Error)]
pub enum PrimitiveError {
    /// The input ends before the declared structure does.
    #[error("truncated primitive: have {have} bytes, need {need}")]
    Truncated { have: usize, need: usize },

    /// The 4-byte magic prefix matches no known kind.
    #[error("unknown magic: {}", hex::encode(.0))]
    UnknownMagic([u8; 4]),

    /// The input carries bytes past the end of the declared structure.
    #[error("trailing bytes after primitive body")]
    TrailingBytes,

    /// The body exceeds the size ceiling.
    #[error("primitive body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// The body failed structural decoding.
    #[error("malformed {kind} body: {reason}")]
    MalformedBody { kind: &'static str, reason: String },

    /// Verification was requested for a kind that carries no signature.
    #[error("{0} primitives carry no signature")]
    Unsigned(&'static str),

    /// The signature did not verify against the supplied key.
    #[error("signature verification failed for {0}")]
    VerificationFailure(String),
}

/// Result alias for primitive operations.
pub type PrimitiveResult<T> = Result<T, PrimitiveError>;
