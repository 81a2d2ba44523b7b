use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keel_types::{ConnId, ErrorFamily};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{ProtocolError, ProtocolResult, RemoteError};
use crate::spec::ProtocolDef;
use crate::wire::{RequestToken, WireMsg};

type WaiterKey = (ConnId, RequestToken);
type Outcome = Result<Vec<u8>, RemoteError>;
type WaiterMap = Arc<Mutex<HashMap<WaiterKey, oneshot::Sender<Outcome>>>>;

/// Correlates requests with responses over any number of connections.
///
/// Each outbound request claims a token unique on its connection and parks
/// a single-slot waiter under `(connection, token)`. Inbound traffic flows
/// through [`RequestResponder::dispatch`]: responses wake the matching
/// waiter, requests run the registered handler and are always answered
/// under the original token.
pub struct RequestResponder {
    def: Arc<ProtocolDef>,
    waiters: WaiterMap,
}

impl RequestResponder {
    pub fn new(def: Arc<ProtocolDef>) -> Self {
        Self {
            def,
            waiters: Arc::default(),
        }
    }

    pub fn def(&self) -> &Arc<ProtocolDef> {
        &self.def
    }

    /// Send a request and await the response body.
    ///
    /// A failure response is re-raised as [`ProtocolError::Remote`]. With a
    /// timeout, expiry abandons the request and releases its token.
    pub async fn request(
        &self,
        conn: &dyn Connection,
        code: &[u8],
        body: &[u8],
        timeout: Option<Duration>,
    ) -> ProtocolResult<Vec<u8>> {
        match self.request_raw(conn, code, body, timeout).await? {
            Ok(body) => Ok(body),
            Err(remote) => Err(ProtocolError::Remote(remote)),
        }
    }

    /// Like [`RequestResponder::request`], but hands back failure responses
    /// for caller-side handling instead of raising them.
    pub async fn request_raw(
        &self,
        conn: &dyn Connection,
        code: &[u8],
        body: &[u8],
        timeout: Option<Duration>,
    ) -> ProtocolResult<Outcome> {
        let (token, rx) = self.claim_token(conn.id());
        // Releases the waiter slot however this future ends: response,
        // timeout, or cancellation.
        let _slot = SlotGuard {
            key: (conn.id(), token),
            waiters: Arc::clone(&self.waiters),
        };

        conn.send(self.def.pack(code, token, body)?).await?;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(conn = %conn.id(), %token, "request timed out");
                    return Err(ProtocolError::Timeout);
                }
            },
            None => rx.await,
        };
        received.map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Feed one inbound frame through the protocol.
    ///
    /// Undecodable or mis-versioned frames are logged and dropped, as are
    /// responses whose token has no waiter. Inbound requests always get a
    /// response: handler output on success, a packed failure otherwise,
    /// with unregistered codes answered as `RequestUnknown`.
    pub async fn dispatch(&self, conn: &dyn Connection, data: &[u8]) {
        let msg = match self.def.unpack(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(conn = %conn.id(), error = %e, "dropping undecodable frame");
                return;
            }
        };

        if msg.code == self.def.success_code() {
            self.wake_waiter(conn.id(), msg.token, Ok(msg.body));
        } else if msg.code == self.def.failure_code() {
            let remote = self.def.unpack_failure(&msg.body);
            self.wake_waiter(conn.id(), msg.token, Err(remote));
        } else {
            self.answer_request(conn, msg).await;
        }
    }

    async fn answer_request(&self, conn: &dyn Connection, msg: WireMsg) {
        let reply = match self.def.handler(&msg.code) {
            Some(handler) => handler.handle(conn.id(), msg.body).await,
            None => Err(RemoteError::new(
                ErrorFamily::RequestUnknown,
                format!("unknown request code {:02x?}", msg.code),
            )),
        };
        let packed = match reply {
            Ok(body) => self.def.pack_success(msg.token, &body),
            Err(remote) => {
                debug!(conn = %conn.id(), token = %msg.token, error = %remote, "request failed");
                self.def.pack_failure(msg.token, &remote)
            }
        };
        if let Err(e) = conn.send(packed).await {
            warn!(conn = %conn.id(), token = %msg.token, error = %e, "could not send response");
        }
    }

    fn wake_waiter(&self, conn: ConnId, token: RequestToken, outcome: Outcome) {
        let waiter = self
            .waiters
            .lock()
            .expect("lock poisoned")
            .remove(&(conn, token));
        match waiter {
            // The requester may have timed out in the meantime; that is its
            // problem, not ours.
            Some(tx) => drop(tx.send(outcome)),
            None => warn!(%conn, %token, "response for unknown token, dropping"),
        }
    }

    fn claim_token(&self, conn: ConnId) -> (RequestToken, oneshot::Receiver<Outcome>) {
        let mut waiters = self.waiters.lock().expect("lock poisoned");
        let token = loop {
            let candidate = RequestToken::random();
            if !waiters.contains_key(&(conn, candidate)) {
                break candidate;
            }
        };
        let (tx, rx) = oneshot::channel();
        waiters.insert((conn, token), tx);
        (token, rx)
    }

    #[cfg(test)]
    fn pending_waiters(&self) -> usize {
        self.waiters.lock().expect("lock poisoned").len()
    }
}

struct SlotGuard {
    key: WaiterKey,
    waiters: WaiterMap,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.waiters
            .lock()
            .expect("lock poisoned")
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Handler, ProtocolSpec};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    /// Captures outbound frames for inspection instead of moving bytes.
    struct MockConn {
        id: ConnId,
        sent_tx: mpsc::UnboundedSender<Vec<u8>>,
        sent_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
        open: AtomicBool,
    }

    impl MockConn {
        fn new() -> Self {
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            Self {
                id: ConnId::fresh(),
                sent_tx,
                sent_rx: Mutex::new(sent_rx),
                open: AtomicBool::new(true),
            }
        }

        fn take_sent(&self) -> Vec<u8> {
            self.sent_rx
                .lock()
                .unwrap()
                .try_recv()
                .expect("a frame was sent")
        }
    }

    #[async_trait]
    impl Connection for MockConn {
        fn id(&self) -> ConnId {
            self.id
        }

        async fn send(&self, msg: Vec<u8>) -> ProtocolResult<()> {
            if !self.is_open() {
                return Err(ProtocolError::ConnectionClosed);
            }
            self.sent_tx.send(msg).map_err(|_| ProtocolError::ConnectionClosed)
        }

        async fn recv(&self) -> ProtocolResult<Vec<u8>> {
            Err(ProtocolError::ConnectionClosed)
        }

        async fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn handle(&self, _conn: ConnId, body: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
            Ok(body)
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        async fn handle(&self, _conn: ConnId, _body: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
            Err(RemoteError::new(ErrorFamily::DoesNotExist, "nope"))
        }
    }

    fn responder() -> RequestResponder {
        let def = ProtocolSpec::new(*b"v1")
            .success(*b"OK")
            .failure(*b"NO")
            .request(*b"RQ", Arc::new(EchoHandler))
            .request(*b"FL", Arc::new(FailingHandler))
            .error_code(*b"\x01", ErrorFamily::DoesNotExist)
            .build()
            .unwrap();
        RequestResponder::new(Arc::new(def))
    }

    /// Pull the frame the requester sent and answer it through dispatch.
    async fn respond_success(r: &RequestResponder, conn: &MockConn, body: &[u8]) {
        let sent = conn.take_sent();
        let msg = r.def().unpack(&sent).unwrap();
        let reply = r.def().pack_success(msg.token, body);
        r.dispatch(conn, &reply).await;
    }

    #[tokio::test]
    async fn request_gets_the_matching_response() {
        let r = Arc::new(responder());
        let conn = Arc::new(MockConn::new());

        let pending = {
            let r = r.clone();
            let conn = conn.clone();
            tokio::spawn(async move { r.request(conn.as_ref(), b"RQ", b"ping", None).await })
        };
        tokio::task::yield_now().await;
        respond_success(&r, &conn, b"pong").await;

        assert_eq!(pending.await.unwrap().unwrap(), b"pong");
        assert_eq!(r.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn failure_response_is_reraised_with_its_family() {
        let r = Arc::new(responder());
        let conn = Arc::new(MockConn::new());

        let pending = {
            let r = r.clone();
            let conn = conn.clone();
            tokio::spawn(async move { r.request(conn.as_ref(), b"RQ", b"ping", None).await })
        };
        tokio::task::yield_now().await;
        let msg = r.def().unpack(&conn.take_sent()).unwrap();
        let failure = r
            .def()
            .pack_failure(msg.token, &RemoteError::new(ErrorFamily::DoesNotExist, "gone"));
        r.dispatch(conn.as_ref(), &failure).await;

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.family(), ErrorFamily::DoesNotExist);
    }

    #[tokio::test]
    async fn request_raw_hands_failures_back() {
        let r = Arc::new(responder());
        let conn = Arc::new(MockConn::new());

        let pending = {
            let r = r.clone();
            let conn = conn.clone();
            tokio::spawn(async move { r.request_raw(conn.as_ref(), b"RQ", b"", None).await })
        };
        tokio::task::yield_now().await;
        let msg = r.def().unpack(&conn.take_sent()).unwrap();
        let failure = r
            .def()
            .pack_failure(msg.token, &RemoteError::new(ErrorFamily::DoesNotExist, "gone"));
        r.dispatch(conn.as_ref(), &failure).await;

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(
            outcome.unwrap_err(),
            RemoteError::new(ErrorFamily::DoesNotExist, "gone")
        );
    }

    #[tokio::test]
    async fn timeout_abandons_the_request_and_frees_the_token() {
        let r = responder();
        let conn = MockConn::new();
        let err = r
            .request(&conn, b"RQ", b"ping", Some(Duration::from_millis(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Timeout));
        assert_eq!(r.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn cancellation_frees_the_token() {
        let r = Arc::new(responder());
        let conn = Arc::new(MockConn::new());
        let pending = {
            let r = r.clone();
            let conn = conn.clone();
            tokio::spawn(async move { r.request(conn.as_ref(), b"RQ", b"", None).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(r.pending_waiters(), 1);
        pending.abort();
        let _ = pending.await;
        assert_eq!(r.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn unknown_token_is_dropped_quietly() {
        let r = responder();
        let conn = MockConn::new();
        let stray = r.def().pack_success(RequestToken(0x4242), b"stale");
        r.dispatch(&conn, &stray).await;
        assert_eq!(r.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn misversioned_frame_is_dropped() {
        let r = responder();
        let conn = MockConn::new();
        let alien = ProtocolSpec::new(*b"v9")
            .success(*b"OK")
            .failure(*b"NO")
            .build()
            .unwrap()
            .pack_success(RequestToken(1), b"");
        r.dispatch(&conn, &alien).await;
        // Nothing sent back, nothing woken.
        assert!(conn.sent_rx.lock().unwrap().try_recv().is_err());
    }

    #[tokio::test]
    async fn inbound_request_is_answered_under_its_token() {
        let r = responder();
        let conn = MockConn::new();
        let inbound = r.def().pack(b"RQ", RequestToken(0x7777), b"echo me").unwrap();
        r.dispatch(&conn, &inbound).await;

        let reply = r.def().unpack(&conn.take_sent()).unwrap();
        assert_eq!(reply.code, r.def().success_code());
        assert_eq!(reply.token, RequestToken(0x7777));
        assert_eq!(reply.body, b"echo me");
    }

    #[tokio::test]
    async fn handler_error_becomes_a_failure_frame() {
        let r = responder();
        let conn = MockConn::new();
        let inbound = r.def().pack(b"FL", RequestToken(3), b"").unwrap();
        r.dispatch(&conn, &inbound).await;

        let reply = r.def().unpack(&conn.take_sent()).unwrap();
        assert_eq!(reply.code, r.def().failure_code());
        assert_eq!(reply.token, RequestToken(3));
        let remote = r.def().unpack_failure(&reply.body);
        assert_eq!(remote.family, ErrorFamily::DoesNotExist);
        assert_eq!(remote.message, "nope");
    }

    #[tokio::test]
    async fn unregistered_request_code_is_request_unknown() {
        // A second definition shares the vocabulary shape but knows an
        // extra code this responder does not handle.
        let foreign = ProtocolSpec::new(*b"v1")
            .success(*b"OK")
            .failure(*b"NO")
            .request(*b"ZZ", Arc::new(EchoHandler))
            .build()
            .unwrap();
        let r = responder();
        let conn = MockConn::new();
        let inbound = foreign.pack(b"ZZ", RequestToken(5), b"").unwrap();
        r.dispatch(&conn, &inbound).await;

        let reply = r.def().unpack(&conn.take_sent()).unwrap();
        assert_eq!(reply.code, r.def().failure_code());
        // RequestUnknown is not registered in this definition, so it
        // travels as the generic failure.
        let remote = r.def().unpack_failure(&reply.body);
        assert_eq!(remote.family, ErrorFamily::RequestError);
    }

    #[tokio::test]
    async fn concurrent_requests_correlate_out_of_order() {
        let r = Arc::new(responder());
        let conn = Arc::new(MockConn::new());

        let mut pending = Vec::new();
        for i in 0u8..8 {
            let r = r.clone();
            let conn = conn.clone();
            pending.push(tokio::spawn(async move {
                r.request(conn.as_ref(), b"RQ", &[i], None).await
            }));
        }
        // Collect all outbound frames, then answer them in reverse order,
        // echoing each request body back.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut frames = Vec::new();
        for _ in 0..8 {
            frames.push(r.def().unpack(&conn.take_sent()).unwrap());
        }
        for frame in frames.iter().rev() {
            let reply = r.def().pack_success(frame.token, &frame.body);
            r.dispatch(conn.as_ref(), &reply).await;
        }

        for (i, task) in pending.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().unwrap(), vec![i as u8]);
        }
        assert_eq!(r.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn send_failure_surfaces_immediately() {
        let r = responder();
        let conn = MockConn::new();
        conn.close().await;
        let err = r.request(&conn, b"RQ", b"", None).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
        assert_eq!(r.pending_waiters(), 0);
    }
}
