use std::sync::Arc;
use std::time::Duration;

use keel_protocol::{Connection, RequestResponder};
use tracing::debug;

/// Pump inbound frames through the responder until the connection dies.
pub async fn listen_forever(conn: Arc<dyn Connection>, responder: Arc<RequestResponder>) {
    loop {
        match conn.recv().await {
            Ok(frame) => responder.dispatch(conn.as_ref(), &frame).await,
            Err(_) => {
                debug!(conn = %conn.id(), "listener stopping");
                break;
            }
        }
    }
}

/// Like [`listen_forever`], but sends a keepalive whenever `interval`
/// passes without traffic.
///
/// The in-flight receive future is kept across timer wins, so a keepalive
/// never discards a partially-awaited frame.
pub async fn listen_with_heartbeat(
    conn: Arc<dyn Connection>,
    responder: Arc<RequestResponder>,
    interval: Duration,
) {
    let mut in_flight = conn.recv();
    loop {
        tokio::select! {
            received = &mut in_flight => {
                match received {
                    Ok(frame) => {
                        responder.dispatch(conn.as_ref(), &frame).await;
                        in_flight = conn.recv();
                    }
                    Err(_) => {
                        debug!(conn = %conn.id(), "listener stopping");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(interval) => {
                if conn.keepalive().await.is_err() {
                    debug!(conn = %conn.id(), "keepalive failed, listener stopping");
                    break;
                }
            }
        }
    }
}
