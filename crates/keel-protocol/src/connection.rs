use async_trait::async_trait;
use keel_types::ConnId;

use crate::error::ProtocolResult;

/// A bidirectional message transport.
///
/// Messages are discrete byte frames; ordering is preserved per direction.
/// After `close`, both `send` and `recv` fail fast with
/// [`ProtocolError::ConnectionClosed`](crate::ProtocolError::ConnectionClosed)
/// rather than blocking.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Process-unique identifier for this connection.
    fn id(&self) -> ConnId;

    /// Send one frame.
    async fn send(&self, msg: Vec<u8>) -> ProtocolResult<()>;

    /// Receive the next frame.
    async fn recv(&self) -> ProtocolResult<Vec<u8>>;

    /// Close the connection. Safe to call more than once.
    async fn close(&self);

    fn is_open(&self) -> bool;

    /// Transport-level liveness probe. No-op unless the transport has one.
    async fn keepalive(&self) -> ProtocolResult<()> {
        Ok(())
    }
}
