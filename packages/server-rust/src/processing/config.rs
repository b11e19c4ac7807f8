//! Request processing configuration.

use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Upper bound on awaiting a submitted workflow's result. `None` waits
    /// indefinitely.
    pub invocation_timeout: Option<Duration>,
}
