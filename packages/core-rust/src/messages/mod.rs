//! Request/response model exchanged between the codec, the processor and the
//! broker client.
//!
//! Both hierarchies are closed enums so every consumer must handle every
//! variant. Responses always carry the `request_id` of the request that
//! produced them; only a [`ErrorResponse::Generic`] may lack one.

pub mod request;
pub mod response;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash;

pub use request::{BusRequest, InvokeWithEntity, InvokeWithoutEntity, QueryEntityState};
pub use response::{
    BusResponse, Confirmation, ConfirmationKind, ErrorResponse, FlowOutput, InvocationState,
    StateOutput,
};

// ---------------------------------------------------------------------------
// RequestKind
// ---------------------------------------------------------------------------

/// Discriminant of a [`BusRequest`], carried on replies that refer back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    InvokeWithoutEntity,
    InvokeWithEntity,
    QueryEntityState,
}

impl RequestKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvokeWithoutEntity => "InvokeWithoutEntity",
            Self::InvokeWithEntity => "InvokeWithEntity",
            Self::QueryEntityState => "QueryEntityState",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ErrorCause
// ---------------------------------------------------------------------------

/// Classification of a failure reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The inbound payload could not be decoded.
    Format,
    /// No workflow with the requested name is registered.
    ClassNotFound,
    /// No constructor of the workflow accepted the parameters.
    NoMatchingConstructor,
    /// The ledger rejected the submission or the workflow failed.
    Invocation,
    /// The workflow succeeded but its result has an unsupported shape.
    Derivation,
    /// A successful invocation lacked an entity id or transaction hash.
    IllegalState,
    /// The invocation result did not arrive in time.
    Timeout,
    /// An entity state query failed.
    Query,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Format => "Format",
            Self::ClassNotFound => "ClassNotFound",
            Self::NoMatchingConstructor => "NoMatchingConstructor",
            Self::Invocation => "Invocation",
            Self::Derivation => "Derivation",
            Self::IllegalState => "IllegalState",
            Self::Timeout => "Timeout",
            Self::Query => "Query",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request failed: a classification plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCause {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorCause {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Stable non-negative code identifying this kind of failure.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        hash::error_code(self.kind.as_str(), &self.message)
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_depends_on_kind_and_message() {
        let a = ErrorCause::new(ErrorKind::Invocation, "boom");
        let b = ErrorCause::new(ErrorKind::Invocation, "boom");
        let c = ErrorCause::new(ErrorKind::Query, "boom");
        assert_eq!(a.error_code(), b.error_code());
        assert_ne!(a.error_code(), c.error_code());
        assert!(a.error_code() >= 0);
    }

    #[test]
    fn display_includes_kind() {
        let cause = ErrorCause::new(ErrorKind::ClassNotFound, "Unable to find 'X'");
        assert_eq!(cause.to_string(), "ClassNotFound: Unable to find 'X'");
    }
}
