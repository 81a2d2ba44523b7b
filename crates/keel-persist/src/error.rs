use keel_types::{ErrorFamily, Ghid};
use thiserror::Error;

/// Errors from the persistence engine.
///
/// Every variant collapses into an [`ErrorFamily`] via [`PersistError::family`]
/// so the protocol layer can carry it across the wire.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Bytes do not parse as any known primitive.
    #[error("malformed primitive: {0}")]
    MalformedPrimitive(String),

    /// The claimed author (or recipient) identity is not on record.
    #[error("unknown identity: {0}")]
    InvalidIdentity(Ghid),

    /// The trailing signature did not verify against the author's key.
    #[error("signature verification failed: {0}")]
    VerificationFailure(String),

    /// The referenced target is a kind this relationship may not point at.
    #[error("{object} may not target {target}")]
    InvalidTarget { object: String, target: String },

    /// A binder or debinder does not match its target's author.
    #[error("inconsistent author on {object}: expected {expected}, got {actual}")]
    InconsistentAuthor {
        object: String,
        expected: Ghid,
        actual: Ghid,
    },

    /// The object's ghid has already been debound.
    #[error("already debound: {0}")]
    AlreadyDebound(Ghid),

    /// A container arrived with no surviving binding.
    #[error("unbound container: {0}")]
    UnboundContainer(Ghid),

    /// A dynamic frame's counter did not increase monotonically.
    #[error("illegal frame at {address}: counter moved from {existing} to {proposed}")]
    IllegalDynamicFrame {
        address: Ghid,
        existing: u64,
        proposed: u64,
    },

    /// A referenced object does not exist locally.
    #[error("does not exist: {0}")]
    DoesNotExist(Ghid),

    /// A background task failed to complete.
    #[error("internal: {0}")]
    Internal(String),
}

impl PersistError {
    /// The wire-level error family this error collapses into.
    pub fn family(&self) -> ErrorFamily {
        match self {
            Self::MalformedPrimitive(_) => ErrorFamily::MalformedPrimitive,
            Self::InvalidIdentity(_) | Self::InconsistentAuthor { .. } => {
                ErrorFamily::InvalidIdentity
            }
            Self::VerificationFailure(_) => ErrorFamily::VerificationFailure,
            Self::InvalidTarget { .. } => ErrorFamily::InvalidTarget,
            Self::AlreadyDebound(_) => ErrorFamily::AlreadyDebound,
            Self::UnboundContainer(_) => ErrorFamily::UnboundContainer,
            Self::IllegalDynamicFrame { .. } => ErrorFamily::IllegalDynamicFrame,
            Self::DoesNotExist(_) => ErrorFamily::DoesNotExist,
            Self::Internal(_) => ErrorFamily::RequestError,
        }
    }
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
