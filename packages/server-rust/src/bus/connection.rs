//! Background reconnect state machine owning the broker queue handles.
//!
//! `start` spawns one task that opens the sender/receiver pair, retrying with
//! doubling backoff. On success it publishes [`ConnectionStatus::Ready`]
//! carrying the handles and exits. Dependents watch the status channel;
//! identical consecutive states are never re-published.
//!
//! State machine: `Stopped -> Connecting -> Ready <-> Connecting -> Stopped`

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::BusConfig;
use super::fatal::FatalHandler;
use super::transport::{BusTransport, QueueReceiver, QueueSender, TransportError};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// A live sender/receiver pair for the configured queues.
pub struct BusHandles {
    pub sender: Arc<dyn QueueSender>,
    pub receiver: Arc<dyn QueueReceiver>,
}

impl BusHandles {
    async fn close(&self) {
        if let Err(e) = self.sender.close().await {
            warn!(queue = self.sender.queue_name(), error = %e, "failed to close sender");
        }
        if let Err(e) = self.receiver.close().await {
            warn!(queue = self.receiver.queue_name(), error = %e, "failed to close receiver");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Stopped,
    Connecting,
    Ready,
}

/// Value published on the status channel.
#[derive(Clone)]
pub enum ConnectionStatus {
    Stopped,
    Connecting,
    Ready(Arc<BusHandles>),
}

impl ConnectionStatus {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Stopped => ConnectionState::Stopped,
            Self::Connecting => ConnectionState::Connecting,
            Self::Ready(_) => ConnectionState::Ready,
        }
    }

    #[must_use]
    pub fn handles(&self) -> Option<Arc<BusHandles>> {
        match self {
            Self::Ready(handles) => Some(Arc::clone(handles)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection can't be started twice")]
    AlreadyStarted,
    #[error("connection is not started")]
    NotStarted,
}

/// Publishes `next` only if it changes the observable state.
fn publish(tx: &watch::Sender<ConnectionStatus>, next: ConnectionStatus) -> bool {
    tx.send_if_modified(|current| {
        if current.state() == next.state() {
            false
        } else {
            *current = next;
            true
        }
    })
}

// ---------------------------------------------------------------------------
// BusConnection
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    running: bool,
    worker: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

pub struct BusConnection {
    transport: Arc<dyn BusTransport>,
    config: BusConfig,
    fatal: FatalHandler,
    status: Arc<watch::Sender<ConnectionStatus>>,
    inner: Mutex<Inner>,
}

impl BusConnection {
    #[must_use]
    pub fn new(transport: Arc<dyn BusTransport>, config: BusConfig, fatal: FatalHandler) -> Self {
        let (status, _rx) = watch::channel(ConnectionStatus::Stopped);
        Self {
            transport,
            config,
            fatal,
            status: Arc::new(status),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Spawns the reconnect task.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::AlreadyStarted`] if already running.
    pub fn start(&self) -> Result<(), ConnectionError> {
        let mut inner = self.inner.lock();
        if inner.running {
            return Err(ConnectionError::AlreadyStarted);
        }
        inner.running = true;
        self.spawn_worker(&mut inner);
        Ok(())
    }

    /// Stops the reconnect task, closes any open handles and publishes
    /// `Stopped`. The task is aborted if it does not exit within
    /// `stop_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotStarted`] if not running.
    pub async fn stop(&self) -> Result<(), ConnectionError> {
        let (worker, stop_tx) = {
            let mut inner = self.inner.lock();
            if !inner.running {
                return Err(ConnectionError::NotStarted);
            }
            inner.running = false;
            (inner.worker.take(), inner.stop_tx.take())
        };

        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }
        if let Some(mut worker) = worker {
            if tokio::time::timeout(self.config.stop_timeout, &mut worker)
                .await
                .is_err()
            {
                warn!(
                    timeout_ms = self.config.stop_timeout.as_millis(),
                    "reconnect task did not stop in time, aborting"
                );
                worker.abort();
            }
        }

        let previous = self.status.send_replace(ConnectionStatus::Stopped);
        if let Some(handles) = previous.handles() {
            handles.close().await;
        }
        info!("broker connection stopped");
        Ok(())
    }

    /// Drops the current handles and connects again. A no-op while a
    /// connection attempt is already in progress.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotStarted`] if not running.
    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        let previous = {
            let mut inner = self.inner.lock();
            if !inner.running {
                return Err(ConnectionError::NotStarted);
            }
            let current = self.status.borrow().clone();
            if current.state() == ConnectionState::Connecting {
                return Ok(());
            }
            info!("reconnecting to broker");
            self.spawn_worker(&mut inner);
            current.handles()
        };
        if let Some(handles) = previous {
            handles.close().await;
        }
        Ok(())
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state()
    }

    /// The live handles, if currently `Ready`.
    #[must_use]
    pub fn handles(&self) -> Option<Arc<BusHandles>> {
        self.status.borrow().handles()
    }

    fn spawn_worker(&self, inner: &mut Inner) {
        if let Some(old) = inner.worker.take() {
            old.abort();
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        publish(&self.status, ConnectionStatus::Connecting);
        inner.stop_tx = Some(stop_tx);
        inner.worker = Some(tokio::spawn(connect_loop(
            Arc::clone(&self.transport),
            self.config.clone(),
            Arc::clone(&self.status),
            Arc::clone(&self.fatal),
            stop_rx,
        )));
    }
}

async fn open_handles(
    transport: &dyn BusTransport,
    config: &BusConfig,
) -> Result<BusHandles, TransportError> {
    let sender = transport
        .open_sender(&config.connection_string, &config.outbound_queue)
        .await?;
    match transport
        .open_receiver(&config.connection_string, &config.inbound_queue)
        .await
    {
        Ok(receiver) => Ok(BusHandles { sender, receiver }),
        Err(e) => {
            let _ = sender.close().await;
            Err(e)
        }
    }
}

async fn connect_loop(
    transport: Arc<dyn BusTransport>,
    config: BusConfig,
    status: Arc<watch::Sender<ConnectionStatus>>,
    fatal: FatalHandler,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut backoff = config.retry.backoff_schedule();
    let mut last_error = String::new();

    for attempt in 1..=config.retry.max_attempts {
        metrics::counter!("ledgerbridge_connect_attempts_total").increment(1);
        let result = tokio::select! {
            _ = &mut stop_rx => {
                debug!(attempt, "stopped while connecting");
                return;
            }
            r = open_handles(transport.as_ref(), &config) => r,
        };

        match result {
            Ok(handles) => {
                info!(
                    attempt,
                    inbound = %config.inbound_queue,
                    outbound = %config.outbound_queue,
                    "broker connection ready"
                );
                publish(&status, ConnectionStatus::Ready(Arc::new(handles)));
                return;
            }
            Err(e) if !e.is_transient() => {
                error!(attempt, error = %e, "non-transient broker error while connecting");
                fatal(&e);
                return;
            }
            Err(e) => {
                last_error = e.to_string();
                let Some(pause) = backoff.next() else {
                    break;
                };
                warn!(
                    attempt,
                    backoff_ms = pause.as_millis(),
                    error = %e,
                    "broker connection attempt failed"
                );
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!(attempt, "stopped during backoff");
                        return;
                    }
                    () = tokio::time::sleep(pause) => {}
                }
            }
        }
    }

    let exhausted = TransportError::RetriesExhausted {
        attempts: config.retry.max_attempts,
        last_error,
    };
    error!(error = %exhausted, "giving up on broker connection");
    fatal(&exhausted);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
