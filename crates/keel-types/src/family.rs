use std::fmt;

use serde::{Deserialize, Serialize};

/// Compact error taxonomy shared across the wire.
///
/// Every error the persistence engine or protocol layer can surface to a
/// remote peer collapses into one of these families. Protocol definitions
/// register a fixed-width byte code for each family they want to carry;
/// families without a registered code travel as an opaque failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorFamily {
    /// Bytes do not parse as any known primitive.
    MalformedPrimitive,
    /// The claimed author/binder/debinder/recipient identity is unknown.
    InvalidIdentity,
    /// The cryptographic signature did not verify against the claimed author.
    VerificationFailure,
    /// The referenced target is a kind this relationship may not point at.
    InvalidTarget,
    /// The object's ghid has already been debound.
    AlreadyDebound,
    /// A container arrived with no surviving binding.
    UnboundContainer,
    /// A dynamic frame's counter did not increase monotonically.
    IllegalDynamicFrame,
    /// A referenced object does not exist locally.
    DoesNotExist,
    /// The peer sent a request code this protocol does not define.
    RequestUnknown,
    /// Generic request failure with no more specific family.
    RequestError,
    /// The message version prefix did not match the protocol definition.
    ProtocolVersion,
    /// The transport channel is closed.
    ConnectionClosed,
    /// A caller-side request deadline elapsed.
    Timeout,
}

impl fmt::Display for ErrorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedPrimitive => "malformed-primitive",
            Self::InvalidIdentity => "invalid-identity",
            Self::VerificationFailure => "verification-failure",
            Self::InvalidTarget => "invalid-target",
            Self::AlreadyDebound => "already-debound",
            Self::UnboundContainer => "unbound-container",
            Self::IllegalDynamicFrame => "illegal-dynamic-frame",
            Self::DoesNotExist => "does-not-exist",
            Self::RequestUnknown => "request-unknown",
            Self::RequestError => "request-error",
            Self::ProtocolVersion => "protocol-version-error",
            Self::ConnectionClosed => "connection-closed",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_are_kebab_case() {
        assert_eq!(ErrorFamily::MalformedPrimitive.to_string(), "malformed-primitive");
        assert_eq!(ErrorFamily::IllegalDynamicFrame.to_string(), "illegal-dynamic-frame");
        assert_eq!(ErrorFamily::ProtocolVersion.to_string(), "protocol-version-error");
    }

    #[test]
    fn families_are_hashable_and_ordered() {
        use std::collections::BTreeSet;
        let mut set = BTreeSet::new();
        set.insert(ErrorFamily::Timeout);
        set.insert(ErrorFamily::Timeout);
        set.insert(ErrorFamily::RequestError);
        assert_eq!(set.len(), 2);
    }
}
