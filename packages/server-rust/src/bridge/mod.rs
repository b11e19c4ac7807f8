//! Wires codec, resolver, ledger and broker client into a running bridge.

mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

pub use shutdown::{HealthState, InFlightGuard, ShutdownController};

use crate::bus::{BusClient, BusConfig, BusTransport, ClientError, ConnectionState, FatalHandler};
use crate::codec::WireCodec;
use crate::dispatcher::Dispatcher;
use crate::ledger::LedgerEngine;
use crate::processing::{MessageProcessor, ProcessorConfig};
use crate::resolver::{InvocationResolver, WorkflowCatalog};

/// A started broker client with the dispatcher registered as its consumer.
pub struct Bridge {
    client: BusClient,
    shutdown: Arc<ShutdownController>,
}

impl Bridge {
    /// Starts the broker connection and registers the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Propagates [`ClientError`] from starting the client or registering
    /// the handler.
    pub fn start(
        bus: BusConfig,
        processor: ProcessorConfig,
        codec: Arc<dyn WireCodec>,
        catalog: Arc<dyn WorkflowCatalog>,
        ledger: Arc<dyn LedgerEngine>,
        transport: Arc<dyn BusTransport>,
        fatal: FatalHandler,
    ) -> Result<Self, ClientError> {
        let shutdown = Arc::new(ShutdownController::new());
        let client = BusClient::new(transport, bus, fatal);
        client.start()?;

        let dispatcher = Dispatcher::new(
            codec,
            MessageProcessor::new(InvocationResolver::new(catalog), ledger, processor),
            client.endpoint(),
            Arc::clone(&shutdown),
        );
        client.register_handler(Arc::new(dispatcher))?;
        shutdown.set_ready();
        info!("bridge started");
        Ok(Self { client, shutdown })
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        self.shutdown.health_state()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.client.connection_state()
    }

    pub async fn wait_until_ready(&self) {
        self.client.wait_until_ready().await;
    }

    /// Stops accepting deliveries, waits up to `drain_timeout` for the one in
    /// progress, then closes the client.
    ///
    /// Returns whether the drain finished in time.
    ///
    /// # Errors
    ///
    /// Propagates [`ClientError`] from closing the client.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Result<bool, ClientError> {
        self.shutdown.trigger_shutdown();
        let drained = self.shutdown.wait_for_drain(drain_timeout).await;
        if !drained {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "drain timed out; closing anyway"
            );
        }
        self.client.close().await?;
        info!(drained, "bridge stopped");
        Ok(drained)
    }
}
