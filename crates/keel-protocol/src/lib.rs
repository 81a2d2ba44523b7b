//! Token-multiplexed request/response protocol.
//!
//! A protocol is declared up front as a [`ProtocolSpec`]: a version prefix,
//! success/failure codes, request codes with their handlers, and wire codes
//! for the error families it can carry. Building it validates the whole
//! vocabulary once; everything after that is mechanical.
//!
//! Messages travel as `VERSION ‖ CODE ‖ TOKEN(u16 BE) ‖ BODY`. The
//! [`RequestResponder`] multiplexes any number of in-flight requests per
//! connection on the 16-bit token and runs handlers for the inbound
//! direction.

pub mod connection;
pub mod error;
pub mod responder;
pub mod spec;
pub mod wire;

pub use connection::Connection;
pub use error::{ProtocolDefError, ProtocolError, ProtocolResult, RemoteError};
pub use responder::RequestResponder;
pub use spec::{Handler, ProtocolDef, ProtocolSpec};
pub use wire::{RequestToken, WireMsg};
