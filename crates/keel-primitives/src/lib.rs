//! Wire format for the six Keel primitives.
//!
//! Every primitive packs as `MAGIC(4) ‖ BODY_LEN(u32 BE) ‖ BODY(bincode)`,
//! followed by a 64-byte ed25519 signature for the kinds that carry one
//! (containers, bindings, and debindings). Identity records are the trust
//! anchor and are unsigned; asymmetric requests cannot be verified by a
//! store-and-forward node and are likewise unsigned at this layer.
//!
//! The [`Ghid`](keel_types::Ghid) of a primitive is the BLAKE3 hash of its
//! full packed bytes. For dynamic bindings that hash identifies the *frame*;
//! the stable address is author-chosen material carried in the body.

pub mod error;
pub mod seal;
pub mod wire;

pub use error::{PrimitiveError, PrimitiveResult};
pub use seal::{seal_request, FirstParty, Sealed};
pub use wire::{
    kind_for_magic, magic_for_kind, parse, Parsed, HEADER_LEN, MAGIC_LEN, MAX_BODY_SIZE,
};
