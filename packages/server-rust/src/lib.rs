//! `ledgerbridge` server: bridges a peek-lock message broker to a ledger
//! engine.
//!
//! Inbound requests are decoded by a [`codec::WireCodec`], resolved against a
//! [`resolver::WorkflowCatalog`], run on a [`ledger::LedgerEngine`] and
//! answered with one or more replies on the outbound queue.

pub mod bridge;
pub mod bus;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod ledger;
pub mod logging;
pub mod processing;
pub mod resolver;

pub use bridge::{Bridge, HealthState};
pub use config::{BridgeConfig, LogFormat};
