use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keel_protocol::{Connection, RequestResponder};
use keel_types::ConnId;
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::CommsResult;
use crate::listen::listen_forever;

/// Establishes fresh connections for the manager.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> CommsResult<Arc<dyn Connection>>;
}

/// Lifecycle callbacks around one managed connection.
///
/// The connect hook runs detached so a slow hook cannot stall the
/// listener; the close hook is awaited before any reconnection attempt.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn on_connect(&self, _conn: Arc<dyn Connection>) {}
    async fn on_close(&self, _conn: ConnId) {}
}

struct NoOpLifecycle;

#[async_trait]
impl LifecycleHooks for NoOpLifecycle {}

/// Reconnection policy.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// When off, a failed connect surfaces instead of retrying.
    pub autoretry: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            autoretry: true,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(3600),
        }
    }
}

/// Binary exponential backoff: uniform over `[0, 2^attempts - 1]` seconds,
/// clamped into the configured window.
fn backoff_delay(config: &RetryConfig, attempts: u32) -> Duration {
    let ceiling = 2f64.powi(attempts.min(32) as i32) - 1.0;
    let secs = rand::thread_rng().gen_range(0.0..=ceiling);
    Duration::from_secs_f64(secs).clamp(config.min_delay, config.max_delay)
}

/// Bumps the consecutive-failure count, then draws the delay from the
/// widened window. The first failure already draws from `[0, 1s]`.
fn next_backoff(config: &RetryConfig, attempts: &mut u32) -> Duration {
    *attempts = attempts.saturating_add(1);
    backoff_delay(config, *attempts)
}

/// Owns one connection and keeps it alive.
///
/// [`ConnectionManager::run`] loops: connect (backing off on failure),
/// publish availability, listen until the connection dies, clear
/// availability, close, and go again. Requests issued through the manager
/// park on the availability signal rather than failing while between
/// connections.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    responder: Arc<RequestResponder>,
    retry: RetryConfig,
    hooks: Arc<dyn LifecycleHooks>,
    available_tx: watch::Sender<Option<Arc<dyn Connection>>>,
    stopped: AtomicBool,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        responder: Arc<RequestResponder>,
        retry: RetryConfig,
    ) -> Self {
        let (available_tx, _) = watch::channel(None);
        Self {
            connector,
            responder,
            retry,
            hooks: Arc::new(NoOpLifecycle),
            available_tx,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn responder(&self) -> &Arc<RequestResponder> {
        &self.responder
    }

    pub fn is_available(&self) -> bool {
        self.available_tx.borrow().is_some()
    }

    /// Drive the connection lifecycle until [`ConnectionManager::shutdown`]
    /// or, with autoretry off, until a connect attempt fails.
    pub async fn run(&self) -> CommsResult<()> {
        let mut attempts: u32 = 0;
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
            let conn = match self.connector.connect().await {
                Ok(conn) => conn,
                Err(e) => {
                    if !self.retry.autoretry {
                        return Err(e);
                    }
                    let delay = next_backoff(&self.retry, &mut attempts);
                    warn!(error = %e, ?delay, attempts, "connect failed, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            attempts = 0;
            info!(conn = %conn.id(), "connected");
            self.available_tx.send_replace(Some(conn.clone()));
            {
                let hooks = self.hooks.clone();
                let conn = conn.clone();
                tokio::spawn(async move { hooks.on_connect(conn).await });
            }

            listen_forever(conn.clone(), self.responder.clone()).await;

            self.available_tx.send_replace(None);
            conn.close().await;
            self.hooks.on_close(conn.id()).await;
            info!(conn = %conn.id(), "connection ended");
        }
    }

    /// Stop the lifecycle loop and drop the current connection.
    pub async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let current = self.available_tx.borrow().clone();
        if let Some(conn) = current {
            conn.close().await;
        }
    }

    /// Wait until a live connection is available and return it.
    pub async fn wait_available(&self) -> Arc<dyn Connection> {
        let mut rx = self.available_tx.subscribe();
        loop {
            if let Some(conn) = rx.borrow_and_update().clone() {
                return conn;
            }
            // Cannot fail: the sender lives in self.
            let _ = rx.changed().await;
        }
    }

    /// Send a request over the managed connection, waiting for
    /// availability first.
    pub async fn request(
        &self,
        code: &[u8],
        body: &[u8],
        timeout: Option<Duration>,
    ) -> CommsResult<Vec<u8>> {
        let conn = self.wait_available().await;
        Ok(self
            .responder
            .request(conn.as_ref(), code, body, timeout)
            .await?)
    }
}
