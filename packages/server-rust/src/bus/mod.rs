//! Broker side of the bridge: transport primitive, reconnecting connection,
//! and the client façade with single-consumer delivery.

pub mod ack;
pub mod client;
pub mod config;
pub mod connection;
pub mod fatal;
pub mod memory;
pub mod transport;
pub mod worker;

pub use ack::{BusEndpoint, PendingAck};
pub use client::{BusClient, ClientError, MessageHandler};
pub use config::{BusConfig, LockRenewal, RetryConfig};
pub use connection::{BusConnection, BusHandles, ConnectionError, ConnectionState, ConnectionStatus};
pub use fatal::{exit_process, FatalHandler};
pub use memory::InMemoryBroker;
pub use transport::{
    BusTransport, LockToken, OutboundMessage, QueueReceiver, QueueSender, ReceivedMessage,
    TransportError, JSON_CONTENT_TYPE,
};
pub use worker::{BackgroundRunnable, BackgroundWorker};
