//! Wire codec boundary between broker payloads and the message model.

pub mod numeric;
pub mod workbench;

use ledgerbridge_core::{BusRequest, BusResponse, ErrorCause, ErrorKind, ErrorResponse};

pub use workbench::WorkbenchCodec;

/// A payload that could not be turned into a [`BusRequest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Rejected before a request id could be read.
    #[error("{message}")]
    Uncorrelated { message: String },
    /// Rejected after the request id was read.
    #[error("{message}")]
    Correlatable { request_id: String, message: String },
}

impl FormatError {
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Uncorrelated { .. } => None,
            Self::Correlatable { request_id, .. } => Some(request_id),
        }
    }

    /// The error reply for this failure.
    #[must_use]
    pub fn into_response(self) -> BusResponse {
        let response = match self {
            Self::Uncorrelated { message } => ErrorResponse::Generic {
                request_id: None,
                cause: ErrorCause::new(ErrorKind::Format, message),
            },
            Self::Correlatable {
                request_id,
                message,
            } => ErrorResponse::Correlatable {
                request_id,
                cause: ErrorCause::new(ErrorKind::Format, message),
            },
        };
        BusResponse::Error(response)
    }
}

/// Translates between raw broker payloads and the message model.
pub trait WireCodec: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`FormatError`] for payloads that are not valid requests.
    fn decode(&self, payload: &str) -> Result<BusRequest, FormatError>;

    /// # Errors
    ///
    /// Fails only if the response cannot be serialized.
    fn encode(&self, response: &BusResponse) -> serde_json::Result<String>;
}
