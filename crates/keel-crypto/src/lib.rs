//! Asymmetric crypto wrappers for Keel.
//!
//! The persistence engine treats signing and verification as an opaque
//! collaborator. This crate wraps ed25519 so the rest of the workspace never
//! touches `ed25519-dalek` types directly.

pub mod signer;

pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey, SIGNATURE_LEN};
