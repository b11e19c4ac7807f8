//! Broker client façade: send, acknowledge and single-consumer delivery.
//!
//! The client never opens queue handles itself. It reads them from the
//! status channel of its [`BusConnection`], which only carries handles while
//! the connection is `Ready`. Inbound messages are pulled by a receive pump
//! and handed to a [`BackgroundWorker`] that runs the registered handler.
//! The pump does not receive again until that handler has returned, so at
//! most one inbound message is locked by this client at a time.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ack::{BusEndpoint, PendingAck};
use super::config::BusConfig;
use super::connection::{
    BusConnection, BusHandles, ConnectionError, ConnectionState, ConnectionStatus,
};
use super::fatal::FatalHandler;
use super::transport::{BusTransport, LockToken, OutboundMessage, TransportError};
use super::worker::{BackgroundRunnable, BackgroundWorker};

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// Consumer callback for inbound messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Processes one delivery. The handler owns the acknowledgment.
    async fn on_message(&self, body: String, ack: PendingAck);

    /// Observes receive-side transport errors. Default is a no-op.
    fn notify_exception(&self, _error: &TransportError) {}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("client is not started")]
    NotStarted,
    #[error("client can't be started twice")]
    AlreadyStarted,
    #[error("client is closed")]
    AlreadyClosed,
    #[error("no broker connection is ready")]
    NotConnected,
    #[error("a message handler is already registered")]
    HandlerAlreadyRegistered,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

// ---------------------------------------------------------------------------
// ClientCore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    NotStarted,
    Started,
    /// `close` is draining the consumer; sends and acks still work.
    Closing,
    Closed,
}

struct ClientCore {
    config: BusConfig,
    fatal: FatalHandler,
    lifecycle: Mutex<Lifecycle>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ClientCore {
    fn ensure_started(&self) -> Result<(), ClientError> {
        match *self.lifecycle.lock() {
            Lifecycle::Started | Lifecycle::Closing => Ok(()),
            Lifecycle::NotStarted => Err(ClientError::NotStarted),
            Lifecycle::Closed => Err(ClientError::AlreadyClosed),
        }
    }

    fn current_handles(&self) -> Result<Arc<BusHandles>, ClientError> {
        self.ensure_started()?;
        self.status.borrow().handles().ok_or(ClientError::NotConnected)
    }

    /// Like `current_handles`, but waits up to `ack_ready_timeout` for a
    /// reconnect in progress to publish new handles.
    async fn ready_handles(&self) -> Result<Arc<BusHandles>, ClientError> {
        self.ensure_started()?;
        let mut status = self.status.clone();
        let ready = tokio::time::timeout(
            self.config.ack_ready_timeout,
            status.wait_for(|s| s.handles().is_some()),
        )
        .await;
        match ready {
            Ok(Ok(status)) => status.handles().ok_or(ClientError::NotConnected),
            Ok(Err(_)) | Err(_) => Err(ClientError::NotConnected),
        }
    }

    /// Transient errors are logged; anything else terminates via the fatal
    /// handler.
    fn on_transport_error(&self, operation: &'static str, err: &TransportError) {
        if err.is_transient() {
            warn!(operation, error = %err, "transient broker error");
        } else {
            error!(operation, error = %err, "non-transient broker error");
            (self.fatal)(err);
        }
    }

    async fn send(&self, body: String) -> Result<(), ClientError> {
        let handles = self.current_handles()?;
        if let Err(e) = handles.sender.send(OutboundMessage::json(body)).await {
            metrics::counter!("ledgerbridge_send_dropped_total").increment(1);
            self.on_transport_error("send", &e);
        }
        Ok(())
    }

    /// Locks belong to the queue, not to the receiver that took them, so an
    /// acknowledgment racing a reconnect completes on the new receiver.
    async fn acknowledge(&self, lock_token: LockToken) -> Result<(), ClientError> {
        let handles = self.ready_handles().await?;
        let mut result = handles.receiver.complete(lock_token).await;
        if matches!(result, Err(TransportError::Closed { .. })) {
            debug!(%lock_token, "receiver closed under acknowledgment, retrying");
            let handles = self.ready_handles().await?;
            result = handles.receiver.complete(lock_token).await;
        }
        if let Err(e) = result {
            self.on_transport_error("acknowledge", &e);
        }
        Ok(())
    }

    async fn renew_lock(&self, lock_token: LockToken) -> Result<(), ClientError> {
        let handles = self.current_handles()?;
        if let Err(e) = handles.receiver.renew_lock(lock_token).await {
            self.on_transport_error("renew_lock", &e);
        }
        Ok(())
    }
}

#[async_trait]
impl BusEndpoint for ClientCore {
    async fn send(&self, body: String) -> anyhow::Result<()> {
        ClientCore::send(self, body).await.map_err(Into::into)
    }

    async fn acknowledge(&self, lock_token: LockToken) -> anyhow::Result<()> {
        ClientCore::acknowledge(self, lock_token).await.map_err(Into::into)
    }

    async fn renew_lock(&self, lock_token: LockToken) -> anyhow::Result<()> {
        ClientCore::renew_lock(self, lock_token).await.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

struct Delivery {
    body: String,
    ack: PendingAck,
    /// Fired once the handler has returned.
    done: oneshot::Sender<()>,
}

struct DispatchRunnable {
    handler: Arc<dyn MessageHandler>,
}

#[async_trait]
impl BackgroundRunnable for DispatchRunnable {
    type Task = Delivery;

    async fn run(&mut self, task: Delivery) {
        self.handler.on_message(task.body, task.ack).await;
        let _ = task.done.send(());
    }

    async fn shutdown(&mut self) {
        debug!("consumer worker stopped");
    }
}

#[derive(Default)]
struct Tasks {
    pump: Option<JoinHandle<()>>,
    pump_stop: Option<oneshot::Sender<()>>,
    worker: Option<BackgroundWorker<DispatchRunnable>>,
}

struct Pump {
    core: Arc<ClientCore>,
    connection: Arc<BusConnection>,
    handler: Arc<dyn MessageHandler>,
    deliveries: mpsc::Sender<Delivery>,
}

impl Pump {
    async fn run(self, mut stop_rx: oneshot::Receiver<()>) {
        let endpoint: Arc<dyn BusEndpoint> = self.core.clone();
        let mut status = self.connection.subscribe();
        let mut consecutive_errors = 0u32;

        loop {
            let handles = loop {
                if let Some(handles) = status.borrow_and_update().handles() {
                    break Some(handles);
                }
                tokio::select! {
                    _ = &mut stop_rx => break None,
                    changed = status.changed() => if changed.is_err() { break None },
                }
            };
            let Some(handles) = handles else { break };

            let received = tokio::select! {
                _ = &mut stop_rx => break,
                r = handles.receiver.receive(self.core.config.receive_wait) => r,
            };

            match received {
                Ok(Some(message)) => {
                    consecutive_errors = 0;
                    debug!(
                        lock_token = %message.lock_token,
                        delivery_count = message.delivery_count,
                        "message received"
                    );
                    let (done_tx, done_rx) = oneshot::channel();
                    let delivery = Delivery {
                        body: message.body,
                        ack: PendingAck::with_renewal(
                            Arc::clone(&endpoint),
                            message.lock_token,
                            self.core.config.lock_renewal,
                        ),
                        done: done_tx,
                    };
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        sent = self.deliveries.send(delivery) => if sent.is_err() { break },
                    }
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = done_rx => {}
                    }
                }
                Ok(None) => consecutive_errors = 0,
                Err(e) if e.is_transient() => {
                    consecutive_errors += 1;
                    warn!(
                        queue = handles.receiver.queue_name(),
                        consecutive_errors,
                        error = %e,
                        "transient receive error"
                    );
                    self.handler.notify_exception(&e);
                    if consecutive_errors >= self.core.config.receive_error_threshold {
                        consecutive_errors = 0;
                        if let Err(e) = self.connection.reconnect().await {
                            debug!(error = %e, "reconnect skipped");
                        }
                    } else {
                        tokio::select! {
                            _ = &mut stop_rx => break,
                            () = tokio::time::sleep(self.core.config.receive_error_pause) => {}
                        }
                    }
                }
                Err(e) => {
                    self.handler.notify_exception(&e);
                    self.core.on_transport_error("receive", &e);
                    break;
                }
            }
        }
        debug!("receive pump stopped");
    }
}

// ---------------------------------------------------------------------------
// BusClient
// ---------------------------------------------------------------------------

pub struct BusClient {
    core: Arc<ClientCore>,
    connection: Arc<BusConnection>,
    tasks: Mutex<Tasks>,
}

impl BusClient {
    #[must_use]
    pub fn new(transport: Arc<dyn BusTransport>, config: BusConfig, fatal: FatalHandler) -> Self {
        let connection = Arc::new(BusConnection::new(
            transport,
            config.clone(),
            Arc::clone(&fatal),
        ));
        Self {
            core: Arc::new(ClientCore {
                config,
                fatal,
                lifecycle: Mutex::new(Lifecycle::NotStarted),
                status: connection.subscribe(),
            }),
            connection,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Starts the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyStarted`] or [`ClientError::AlreadyClosed`]
    /// on a second call.
    pub fn start(&self) -> Result<(), ClientError> {
        {
            let mut lifecycle = self.core.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Started => return Err(ClientError::AlreadyStarted),
                Lifecycle::Closing | Lifecycle::Closed => return Err(ClientError::AlreadyClosed),
                Lifecycle::NotStarted => *lifecycle = Lifecycle::Started,
            }
        }
        self.connection.start()?;
        info!(
            inbound = %self.core.config.inbound_queue,
            outbound = %self.core.config.outbound_queue,
            "broker client started"
        );
        Ok(())
    }

    /// Sends a JSON payload. Transport failures are logged and the message is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Fails if the client is not started or no connection is ready.
    pub async fn send(&self, body: impl Into<String>) -> Result<(), ClientError> {
        self.core.send(body.into()).await
    }

    /// Completes the inbound message locked under `lock_token`, waiting for
    /// a reconnect in progress.
    ///
    /// # Errors
    ///
    /// Fails if the client is not started or no connection becomes ready in
    /// time.
    pub async fn acknowledge(&self, lock_token: LockToken) -> Result<(), ClientError> {
        self.core.acknowledge(lock_token).await
    }

    /// Wires the single consumer. Messages are received and delivered one at
    /// a time in receive order; each stays lock-renewed while it is handled.
    ///
    /// # Errors
    ///
    /// Fails if the client is not started or a handler is already registered.
    pub fn register_handler(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ClientError> {
        self.core.ensure_started()?;
        let mut tasks = self.tasks.lock();
        if tasks.worker.is_some() {
            return Err(ClientError::HandlerAlreadyRegistered);
        }

        let worker = BackgroundWorker::start(
            DispatchRunnable {
                handler: Arc::clone(&handler),
            },
            1,
        );
        let Some(deliveries) = worker.sender() else {
            return Err(ClientError::AlreadyClosed);
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let pump = Pump {
            core: Arc::clone(&self.core),
            connection: Arc::clone(&self.connection),
            handler,
            deliveries,
        };
        tasks.pump = Some(tokio::spawn(pump.run(stop_rx)));
        tasks.pump_stop = Some(stop_tx);
        tasks.worker = Some(worker);
        Ok(())
    }

    /// Stops receiving, lets the message in progress finish, then stops the
    /// connection.
    ///
    /// # Errors
    ///
    /// Fails if the client was never started or is already closed.
    pub async fn close(&self) -> Result<(), ClientError> {
        {
            let mut lifecycle = self.core.lifecycle.lock();
            match *lifecycle {
                Lifecycle::NotStarted => return Err(ClientError::NotStarted),
                Lifecycle::Closing | Lifecycle::Closed => return Err(ClientError::AlreadyClosed),
                Lifecycle::Started => *lifecycle = Lifecycle::Closing,
            }
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        if let Some(stop) = tasks.pump_stop {
            let _ = stop.send(());
        }
        if let Some(pump) = tasks.pump {
            let _ = pump.await;
        }
        // Replies of the message in progress still go out on the live
        // handles, so the connection is stopped last.
        if let Some(mut worker) = tasks.worker {
            worker.stop().await;
        }
        *self.core.lifecycle.lock() = Lifecycle::Closed;
        self.connection.stop().await?;
        info!("broker client closed");
        Ok(())
    }

    /// An endpoint handle sharing this client's handles and lifecycle.
    #[must_use]
    pub fn endpoint(&self) -> Arc<dyn BusEndpoint> {
        self.core.clone()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Waits until the connection publishes `Ready`.
    pub async fn wait_until_ready(&self) {
        let mut status = self.connection.subscribe();
        let _ = status
            .wait_for(|s| s.state() == ConnectionState::Ready)
            .await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
