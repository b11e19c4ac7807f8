//! Request processing: resolution, ledger invocation, acknowledgment timing
//! and reply fan-out.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod outcome;

pub use config::ProcessorConfig;
pub use error::ProcessingError;
pub use orchestrator::{MessageProcessor, ENTITY_ID_PARAMETER};
pub use outcome::{derive_outcome, DerivationError, InvocationOutcome};
