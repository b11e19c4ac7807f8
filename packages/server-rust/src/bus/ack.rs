//! One-shot acknowledgment of an inbound delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::LockRenewal;
use super::transport::LockToken;

/// The outbound half of the broker client as seen by message processing.
#[async_trait]
pub trait BusEndpoint: Send + Sync {
    /// Sends a JSON payload to the outbound queue.
    async fn send(&self, body: String) -> anyhow::Result<()>;

    /// Completes the inbound message locked under `lock_token`.
    async fn acknowledge(&self, lock_token: LockToken) -> anyhow::Result<()>;

    /// Extends the lock held under `lock_token`. Default is a no-op for
    /// endpoints whose locks never expire.
    async fn renew_lock(&self, _lock_token: LockToken) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Permission to complete exactly one locked delivery.
///
/// Both `complete` and `abandon` consume the value, so a delivery can be
/// acknowledged at most once. Lock renewal, if any, ends with the value.
#[must_use = "a delivery must be completed or abandoned"]
pub struct PendingAck {
    endpoint: Arc<dyn BusEndpoint>,
    lock_token: LockToken,
    renewal: Option<JoinHandle<()>>,
}

impl PendingAck {
    pub fn new(endpoint: Arc<dyn BusEndpoint>, lock_token: LockToken) -> Self {
        Self {
            endpoint,
            lock_token,
            renewal: None,
        }
    }

    /// Keeps renewing the lock every `renewal.interval` until the delivery
    /// is settled or `renewal.max_duration` has passed.
    pub fn with_renewal(
        endpoint: Arc<dyn BusEndpoint>,
        lock_token: LockToken,
        renewal: LockRenewal,
    ) -> Self {
        let task = tokio::spawn(renew_until(Arc::clone(&endpoint), lock_token, renewal));
        Self {
            endpoint,
            lock_token,
            renewal: Some(task),
        }
    }

    #[must_use]
    pub fn lock_token(&self) -> LockToken {
        self.lock_token
    }

    /// Removes the message from the inbound queue. Failures are logged; the
    /// broker redelivers once the lock expires.
    pub async fn complete(mut self) {
        self.stop_renewal();
        match self.endpoint.acknowledge(self.lock_token).await {
            Ok(()) => debug!(lock_token = %self.lock_token, "message acknowledged"),
            Err(e) => warn!(lock_token = %self.lock_token, error = %e, "failed to acknowledge message"),
        }
    }

    /// Leaves the message locked so the broker redelivers it.
    pub fn abandon(mut self) {
        self.stop_renewal();
        debug!(lock_token = %self.lock_token, "message left for redelivery");
    }

    fn stop_renewal(&mut self) {
        if let Some(task) = self.renewal.take() {
            task.abort();
        }
    }
}

impl Drop for PendingAck {
    fn drop(&mut self) {
        self.stop_renewal();
    }
}

async fn renew_until(endpoint: Arc<dyn BusEndpoint>, lock_token: LockToken, renewal: LockRenewal) {
    let deadline = Instant::now() + renewal.max_duration;
    loop {
        let next = Instant::now() + renewal.interval;
        if next > deadline {
            debug!(%lock_token, "lock renewal limit reached");
            return;
        }
        tokio::time::sleep_until(next).await;
        match endpoint.renew_lock(lock_token).await {
            Ok(()) => debug!(%lock_token, "lock renewed"),
            Err(e) => warn!(%lock_token, error = %e, "failed to renew lock"),
        }
    }
}

impl std::fmt::Debug for PendingAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAck")
            .field("lock_token", &self.lock_token)
            .finish_non_exhaustive()
    }
}
