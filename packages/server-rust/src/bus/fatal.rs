//! Process termination on unrecoverable broker failures.

use std::sync::Arc;

use tracing::error;

use super::transport::TransportError;

/// Called when the bridge can no longer make progress without a restart.
pub type FatalHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Logs the error and exits the process with status 1.
#[must_use]
pub fn exit_process() -> FatalHandler {
    Arc::new(|err: &TransportError| {
        error!(error = %err, "unrecoverable broker failure, terminating");
        std::process::exit(1);
    })
}
