//! In-process peek-lock broker.
//!
//! Named FIFO queues with broker-style delivery: a received message is locked
//! rather than removed, and only `complete` deletes it. A broker built with
//! [`InMemoryBroker::with_lock_duration`] expires locks that are not renewed
//! in time and redelivers their messages; locked messages can also be
//! released at once with [`InMemoryBroker::abandon_locked`] to model a crash.
//! Failures can be scripted for opens, receives and sends.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::transport::{
    BusTransport, LockToken, OutboundMessage, QueueReceiver, QueueSender, ReceivedMessage,
    TransportError,
};

#[derive(Debug, Clone)]
struct Stored {
    body: String,
    delivery_count: u32,
}

#[derive(Debug)]
struct Locked {
    token: LockToken,
    stored: Stored,
    /// `None` when the broker never expires locks.
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Stored>,
    locked: Vec<Locked>,
    notify: Arc<Notify>,
}

impl QueueState {
    /// Moves every lock that expired by `now` back to the head of the queue.
    fn release_expired(&mut self, now: Instant) {
        let (expired, held): (Vec<_>, Vec<_>) = std::mem::take(&mut self.locked)
            .into_iter()
            .partition(|l| l.expires_at.is_some_and(|at| at <= now));
        self.locked = held;
        for lock in expired.into_iter().rev() {
            self.ready.push_front(lock.stored);
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.locked.iter().filter_map(|l| l.expires_at).min()
    }
}

#[derive(Default)]
struct BrokerState {
    queues: Mutex<HashMap<String, QueueState>>,
    lock_duration: Option<Duration>,
    failing_opens: AtomicU32,
    failing_receives: AtomicU32,
    failing_sends: AtomicU32,
    reject_opens: AtomicBool,
    open_attempts: AtomicU32,
}

impl BrokerState {
    fn notifier(&self, queue: &str) -> Arc<Notify> {
        let mut queues = self.queues.lock();
        Arc::clone(&queues.entry(queue.to_string()).or_default().notify)
    }

    fn push_back(&self, queue: &str, body: String) {
        let notify = {
            let mut queues = self.queues.lock();
            let state = queues.entry(queue.to_string()).or_default();
            state.ready.push_back(Stored {
                body,
                delivery_count: 0,
            });
            Arc::clone(&state.notify)
        };
        notify.notify_one();
    }

    /// Runs `f` on the queue after releasing its expired locks.
    fn with_queue<T>(&self, queue: &str, f: impl FnOnce(&mut QueueState) -> T) -> T {
        let mut queues = self.queues.lock();
        let state = queues.entry(queue.to_string()).or_default();
        state.release_expired(Instant::now());
        f(state)
    }

    fn lock_next(&self, queue: &str) -> Option<ReceivedMessage> {
        let expires_at = self.lock_duration.map(|d| Instant::now() + d);
        self.with_queue(queue, |state| {
            let mut stored = state.ready.pop_front()?;
            stored.delivery_count += 1;
            let token = LockToken::new();
            let message = ReceivedMessage {
                body: stored.body.clone(),
                lock_token: token,
                delivery_count: stored.delivery_count,
            };
            state.locked.push(Locked {
                token,
                stored,
                expires_at,
            });
            Some(message)
        })
    }

    fn complete(&self, queue: &str, lock_token: LockToken) -> Result<(), TransportError> {
        self.with_queue(queue, |state| {
            let idx = state
                .locked
                .iter()
                .position(|l| l.token == lock_token)
                .ok_or(TransportError::LockLost(lock_token))?;
            state.locked.remove(idx);
            Ok(())
        })
    }

    fn renew(&self, queue: &str, lock_token: LockToken) -> Result<(), TransportError> {
        let expires_at = self.lock_duration.map(|d| Instant::now() + d);
        self.with_queue(queue, |state| {
            let lock = state
                .locked
                .iter_mut()
                .find(|l| l.token == lock_token)
                .ok_or(TransportError::LockLost(lock_token))?;
            lock.expires_at = expires_at;
            Ok(())
        })
    }

    /// Consumes one scripted failure from `counter`, if any remain.
    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_open(&self, connection_string: &str) -> Result<(), TransportError> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if connection_string.trim().is_empty() {
            return Err(TransportError::Fatal("empty connection string".to_string()));
        }
        if self.reject_opens.load(Ordering::SeqCst) {
            return Err(TransportError::Fatal("unauthorized".to_string()));
        }
        if Self::take_failure(&self.failing_opens) {
            return Err(TransportError::Transient("broker unreachable".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryBroker
// ---------------------------------------------------------------------------

/// Cloneable handle to a shared in-memory broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker whose locks expire unless renewed within `lock_duration`.
    #[must_use]
    pub fn with_lock_duration(lock_duration: Duration) -> Self {
        Self {
            state: Arc::new(BrokerState {
                lock_duration: Some(lock_duration),
                ..BrokerState::default()
            }),
        }
    }

    /// Enqueues a message as an external producer would.
    pub fn publish(&self, queue: &str, body: impl Into<String>) {
        self.state.push_back(queue, body.into());
    }

    /// Removes and returns every ready message on `queue`.
    #[must_use]
    pub fn drain(&self, queue: &str) -> Vec<String> {
        let mut queues = self.state.queues.lock();
        queues
            .get_mut(queue)
            .map(|s| s.ready.drain(..).map(|m| m.body).collect())
            .unwrap_or_default()
    }

    /// Polls until `queue` holds at least `count` ready messages, then drains
    /// it. Returns whatever is there once `timeout` elapses.
    pub async fn wait_for_messages(&self, queue: &str, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.ready_count(queue) >= count || Instant::now() >= deadline {
                return self.drain(queue);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[must_use]
    pub fn ready_count(&self, queue: &str) -> usize {
        self.state.with_queue(queue, |s| s.ready.len())
    }

    #[must_use]
    pub fn locked_count(&self, queue: &str) -> usize {
        self.state.with_queue(queue, |s| s.locked.len())
    }

    /// Releases every locked message on `queue` back to the head of the
    /// queue, in original order. Returns how many were released.
    pub fn abandon_locked(&self, queue: &str) -> usize {
        let (released, notify) = {
            let mut queues = self.state.queues.lock();
            let state = queues.entry(queue.to_string()).or_default();
            let locked: Vec<_> = state.locked.drain(..).collect();
            let released = locked.len();
            for lock in locked.into_iter().rev() {
                state.ready.push_front(lock.stored);
            }
            (released, Arc::clone(&state.notify))
        };
        if released > 0 {
            notify.notify_one();
        }
        released
    }

    /// The next `n` handle opens fail with a transient error.
    pub fn fail_next_opens(&self, n: u32) {
        self.state.failing_opens.store(n, Ordering::SeqCst);
    }

    /// The next `n` receives fail with a transient error.
    pub fn fail_next_receives(&self, n: u32) {
        self.state.failing_receives.store(n, Ordering::SeqCst);
    }

    /// The next `n` sends fail with a transient error.
    pub fn fail_next_sends(&self, n: u32) {
        self.state.failing_sends.store(n, Ordering::SeqCst);
    }

    /// While set, every open fails with a non-transient error.
    pub fn reject_opens(&self, reject: bool) {
        self.state.reject_opens.store(reject, Ordering::SeqCst);
    }

    /// Total handle opens attempted so far.
    #[must_use]
    pub fn open_attempts(&self) -> u32 {
        self.state.open_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BusTransport for InMemoryBroker {
    async fn open_sender(
        &self,
        connection_string: &str,
        queue: &str,
    ) -> Result<Arc<dyn QueueSender>, TransportError> {
        self.state.check_open(connection_string)?;
        Ok(Arc::new(MemorySender {
            queue: queue.to_string(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_receiver(
        &self,
        connection_string: &str,
        queue: &str,
    ) -> Result<Arc<dyn QueueReceiver>, TransportError> {
        self.state.check_open(connection_string)?;
        Ok(Arc::new(MemoryReceiver {
            queue: queue.to_string(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

struct MemorySender {
    queue: String,
    state: Arc<BrokerState>,
    closed: AtomicBool,
}

#[async_trait]
impl QueueSender for MemorySender {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                queue: self.queue.clone(),
            });
        }
        if BrokerState::take_failure(&self.state.failing_sends) {
            return Err(TransportError::Transient("send timed out".to_string()));
        }
        self.state.push_back(&self.queue, message.body);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryReceiver {
    queue: String,
    state: Arc<BrokerState>,
    closed: AtomicBool,
}

impl MemoryReceiver {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed {
                queue: self.queue.clone(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueReceiver for MemoryReceiver {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    async fn receive(&self, max_wait: Duration) -> Result<Option<ReceivedMessage>, TransportError> {
        self.ensure_open()?;
        if BrokerState::take_failure(&self.state.failing_receives) {
            return Err(TransportError::Transient("receive link detached".to_string()));
        }
        let notify = self.state.notifier(&self.queue);
        let deadline = Instant::now() + max_wait;
        loop {
            if let Some(message) = self.state.lock_next(&self.queue) {
                return Ok(Some(message));
            }
            // An expiring lock makes a message ready without a publish.
            let wake = self
                .state
                .with_queue(&self.queue, |s| s.next_expiry())
                .map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                () = notify.notified() => self.ensure_open()?,
                () = tokio::time::sleep_until(wake) => {
                    if wake == deadline {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn complete(&self, lock_token: LockToken) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.state.complete(&self.queue, lock_token)
    }

    async fn renew_lock(&self, lock_token: LockToken) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.state.renew(&self.queue, lock_token)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.state.notifier(&self.queue).notify_waiters();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
