//! Command-line and environment configuration for the bridge process.

use std::fmt;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::bus::{BusConfig, LockRenewal, RetryConfig};
use crate::processing::ProcessorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Parser)]
#[command(name = "loopback-bridge")]
#[command(about = "Bridges a peek-lock message broker to a ledger engine", long_about = None)]
#[command(version)]
pub struct BridgeConfig {
    /// Broker endpoint and credentials
    #[arg(long, env = "LEDGERBRIDGE_CONNECTION_STRING")]
    pub connection_string: String,

    /// Queue requests are received from
    #[arg(long, env = "LEDGERBRIDGE_INBOUND_QUEUE")]
    pub inbound_queue: String,

    /// Queue replies are sent to
    #[arg(long, env = "LEDGERBRIDGE_OUTBOUND_QUEUE")]
    pub outbound_queue: String,

    #[arg(long, default_value_t = 10)]
    pub max_connect_attempts: u32,

    #[arg(long, default_value_t = 1000)]
    pub initial_backoff_ms: u64,

    #[arg(long, default_value_t = 60_000)]
    pub max_backoff_ms: u64,

    /// Bound on joining the reconnect task at shutdown
    #[arg(long, default_value_t = 60_000)]
    pub stop_timeout_ms: u64,

    /// Fail an invocation whose result takes longer than this
    #[arg(long)]
    pub invocation_timeout_ms: Option<u64>,

    /// Pause between lock renewals of the delivery being processed
    #[arg(long, default_value_t = 10_000)]
    pub lock_renew_interval_ms: u64,

    /// Stop renewing a delivery's lock after this long
    #[arg(long, default_value_t = 60_000)]
    pub max_lock_renewal_ms: u64,

    /// Consecutive transient receive errors before reconnecting
    #[arg(long, default_value_t = 5)]
    pub receive_error_threshold: u32,

    /// Identifier echoed as `connectionId` in replies
    #[arg(long, default_value_t = 1)]
    pub connection_id: u32,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl BridgeConfig {
    #[must_use]
    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            connection_string: self.connection_string.clone(),
            inbound_queue: self.inbound_queue.clone(),
            outbound_queue: self.outbound_queue.clone(),
            retry: RetryConfig {
                max_attempts: self.max_connect_attempts,
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
            },
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            lock_renewal: LockRenewal {
                interval: Duration::from_millis(self.lock_renew_interval_ms),
                max_duration: Duration::from_millis(self.max_lock_renewal_ms),
            },
            receive_error_threshold: self.receive_error_threshold,
            ..BusConfig::default()
        }
    }

    #[must_use]
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            invocation_timeout: self.invocation_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("connection_string", &"<redacted>")
            .field("inbound_queue", &self.inbound_queue)
            .field("outbound_queue", &self.outbound_queue)
            .field("max_connect_attempts", &self.max_connect_attempts)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("stop_timeout_ms", &self.stop_timeout_ms)
            .field("invocation_timeout_ms", &self.invocation_timeout_ms)
            .field("lock_renew_interval_ms", &self.lock_renew_interval_ms)
            .field("max_lock_renewal_ms", &self.max_lock_renewal_ms)
            .field("receive_error_threshold", &self.receive_error_threshold)
            .field("connection_id", &self.connection_id)
            .field("log_format", &self.log_format)
            .finish()
    }
}
