//! Connection lifecycle on top of the protocol layer.
//!
//! [`MemoryConnection`] is the in-process duplex transport; network
//! transports implement the same [`Connection`](keel_protocol::Connection)
//! trait. [`listen_forever`] and [`listen_with_heartbeat`] pump inbound
//! frames into a responder, and [`ConnectionManager`] keeps exactly one
//! connection alive with exponential-backoff reconnection and an
//! availability signal for outbound requests.

pub mod error;
pub mod listen;
pub mod manager;
pub mod memory;

pub use error::{CommsError, CommsResult};
pub use listen::{listen_forever, listen_with_heartbeat};
pub use manager::{ConnectionManager, Connector, LifecycleHooks, RetryConfig};
pub use memory::MemoryConnection;
