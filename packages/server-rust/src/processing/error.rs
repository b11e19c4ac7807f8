//! Failures that end a request with a workflow error reply.

use std::time::Duration;

use ledgerbridge_core::{ErrorCause, ErrorKind};

use super::outcome::DerivationError;
use crate::ledger::LedgerError;
use crate::resolver::ResolutionError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// Submission was refused or the workflow failed while running.
    #[error(transparent)]
    Invocation(LedgerError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error("{0}")]
    IllegalState(String),
    #[error("workflow did not complete within {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error(transparent)]
    Query(LedgerError),
}

impl ProcessingError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution(ResolutionError::ClassNotFound { .. }) => ErrorKind::ClassNotFound,
            Self::Resolution(ResolutionError::NoMatchingConstructor { .. }) => {
                ErrorKind::NoMatchingConstructor
            }
            Self::Invocation(_) => ErrorKind::Invocation,
            Self::Derivation(_) => ErrorKind::Derivation,
            Self::IllegalState(_) => ErrorKind::IllegalState,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Query(_) => ErrorKind::Query,
        }
    }

    /// The wire form of this error.
    #[must_use]
    pub fn cause(&self) -> ErrorCause {
        ErrorCause::new(self.kind(), self.to_string())
    }
}
