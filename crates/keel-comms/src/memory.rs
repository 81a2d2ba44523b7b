use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use keel_protocol::{Connection, ProtocolError, ProtocolResult};
use keel_types::ConnId;
use tokio::sync::{mpsc, Mutex, Notify};

/// In-process duplex transport.
///
/// A pair shares one closed flag: closing either end kills the link, and
/// both ends fail fast afterwards, including receivers already parked.
pub struct MemoryConnection {
    id: ConnId,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
}

impl MemoryConnection {
    /// Two connected ends.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let close_notify = Arc::new(Notify::new());

        let a = Arc::new(Self {
            id: ConnId::fresh(),
            tx: a_tx,
            rx: Mutex::new(a_rx),
            closed: closed.clone(),
            close_notify: close_notify.clone(),
        });
        let b = Arc::new(Self {
            id: ConnId::fresh(),
            tx: b_tx,
            rx: Mutex::new(b_rx),
            closed,
            close_notify,
        });
        (a, b)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> ConnId {
        self.id
    }

    async fn send(&self, msg: Vec<u8>) -> ProtocolResult<()> {
        if !self.is_open() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.tx
            .send(msg)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    async fn recv(&self) -> ProtocolResult<Vec<u8>> {
        // Register for the close signal before checking the flag, so a
        // close landing between the check and the select cannot be missed.
        let closed = self.close_notify.notified();
        tokio::pin!(closed);
        if !self.is_open() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            msg = rx.recv() => msg.ok_or(ProtocolError::ConnectionClosed),
            _ = &mut closed => Err(ProtocolError::ConnectionClosed),
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_notify.notify_waiters();
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn frames_flow_both_ways_in_order() {
        let (a, b) = MemoryConnection::pair();
        a.send(b"one".to_vec()).await.unwrap();
        a.send(b"two".to_vec()).await.unwrap();
        b.send(b"back".to_vec()).await.unwrap();

        assert_eq!(b.recv().await.unwrap(), b"one");
        assert_eq!(b.recv().await.unwrap(), b"two");
        assert_eq!(a.recv().await.unwrap(), b"back");
    }

    #[tokio::test]
    async fn ends_have_distinct_ids() {
        let (a, b) = MemoryConnection::pair();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_fails_both_ends_fast() {
        let (a, b) = MemoryConnection::pair();
        a.close().await;
        a.close().await;

        assert!(!a.is_open());
        assert!(!b.is_open());
        assert!(matches!(
            a.send(vec![]).await.unwrap_err(),
            ProtocolError::ConnectionClosed
        ));
        assert!(matches!(
            b.recv().await.unwrap_err(),
            ProtocolError::ConnectionClosed
        ));
    }

    #[tokio::test]
    async fn close_wakes_a_parked_receiver() {
        let (a, b) = MemoryConnection::pair();
        let parked = tokio::spawn(async move { b.recv().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        a.close().await;
        let result = parked.await.unwrap();
        assert!(matches!(result.unwrap_err(), ProtocolError::ConnectionClosed));
    }
}
