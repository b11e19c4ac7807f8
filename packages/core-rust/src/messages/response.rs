//! Outbound replies produced for each processed request.

use serde::{Deserialize, Serialize};

use crate::fields::FieldMap;
use crate::types::{EntityId, Party, TransactionHash};

use super::{ErrorCause, RequestKind};

/// Result of a successful invocation: the output entity's flattened state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowOutput {
    pub request_id: String,
    pub entity_id: EntityId,
    pub fields: FieldMap,
    pub is_new_entity: bool,
    pub from_party: Party,
    pub to_parties: Vec<Party>,
    pub transaction_hash: TransactionHash,
}

/// Result of a state query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOutput {
    pub request_id: String,
    pub entity_id: EntityId,
    pub fields: FieldMap,
    pub is_new_entity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationKind {
    /// The invocation was accepted and scheduled by the ledger engine.
    Submitted,
    /// The invocation's transaction was committed.
    Committed,
}

impl ConfirmationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Committed => "Committed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub kind: ConfirmationKind,
    pub request_id: String,
    pub entity_id: EntityId,
    pub request_kind: RequestKind,
}

/// Record of a workflow invocation, emitted once per recipient party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationState {
    pub request_id: String,
    pub entity_id: EntityId,
    /// The parameters exactly as received, without the injected entity id.
    pub parameters: FieldMap,
    /// The party that invoked the workflow.
    pub caller: Party,
    /// The counterparty this record is addressed to.
    pub recipient: Party,
    pub workflow_name: String,
    pub transaction_hash: TransactionHash,
}

impl InvocationState {
    /// Unqualified workflow name (`SimpleFlow` for `com.x.SimpleFlow`).
    #[must_use]
    pub fn simple_workflow_name(&self) -> &str {
        self.workflow_name
            .rsplit_once('.')
            .map_or(self.workflow_name.as_str(), |(_, simple)| simple)
    }
}

/// A failed request, in one of three correlation strengths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all_fields = "camelCase")]
pub enum ErrorResponse {
    /// No request id could be extracted from the payload.
    Generic {
        request_id: Option<String>,
        cause: ErrorCause,
    },
    /// The payload was malformed after the request id was read.
    Correlatable { request_id: String, cause: ErrorCause },
    /// Resolution, invocation, derivation or query failed.
    Workflow {
        request_id: String,
        request_kind: RequestKind,
        cause: ErrorCause,
        entity_id: Option<EntityId>,
    },
}

impl ErrorResponse {
    #[must_use]
    pub fn cause(&self) -> &ErrorCause {
        match self {
            Self::Generic { cause, .. }
            | Self::Correlatable { cause, .. }
            | Self::Workflow { cause, .. } => cause,
        }
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Generic { request_id, .. } => request_id.as_deref(),
            Self::Correlatable { request_id, .. } | Self::Workflow { request_id, .. } => {
                Some(request_id)
            }
        }
    }
}

/// A reply destined for the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusResponse {
    FlowOutput(FlowOutput),
    StateOutput(StateOutput),
    Confirmation(Confirmation),
    InvocationState(InvocationState),
    Error(ErrorResponse),
}

impl BusResponse {
    /// The correlation id, absent only for a generic error.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::FlowOutput(r) => Some(&r.request_id),
            Self::StateOutput(r) => Some(&r.request_id),
            Self::Confirmation(r) => Some(&r.request_id),
            Self::InvocationState(r) => Some(&r.request_id),
            Self::Error(e) => e.request_id(),
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::FlowOutput(r) => Some(&r.entity_id),
            Self::StateOutput(r) => Some(&r.entity_id),
            Self::Confirmation(r) => Some(&r.entity_id),
            Self::InvocationState(r) => Some(&r.entity_id),
            Self::Error(ErrorResponse::Workflow { entity_id, .. }) => entity_id.as_ref(),
            Self::Error(_) => None,
        }
    }

    /// Short label used for logging and metrics.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::FlowOutput(_) => "FlowOutput",
            Self::StateOutput(_) => "StateOutput",
            Self::Confirmation(c) => match c.kind {
                ConfirmationKind::Submitted => "Submitted",
                ConfirmationKind::Committed => "Committed",
            },
            Self::InvocationState(_) => "InvocationState",
            Self::Error(ErrorResponse::Generic { .. }) => "GenericError",
            Self::Error(ErrorResponse::Correlatable { .. }) => "CorrelatableError",
            Self::Error(ErrorResponse::Workflow { .. }) => "WorkflowError",
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ErrorKind;

    fn party() -> Party {
        "O=Member 1, L=London, C=GB".parse().unwrap()
    }

    #[test]
    fn generic_error_has_no_request_id() {
        let resp = BusResponse::Error(ErrorResponse::Generic {
            request_id: None,
            cause: ErrorCause::new(ErrorKind::Format, "No ingress message presented"),
        });
        assert_eq!(resp.request_id(), None);
        assert_eq!(resp.entity_id(), None);
        assert_eq!(resp.variant_name(), "GenericError");
        assert!(resp.is_error());
    }

    #[test]
    fn workflow_error_threads_entity_id() {
        let id = EntityId::new();
        let resp = BusResponse::Error(ErrorResponse::Workflow {
            request_id: "r".into(),
            request_kind: RequestKind::InvokeWithEntity,
            cause: ErrorCause::new(ErrorKind::ClassNotFound, "missing"),
            entity_id: Some(id.clone()),
        });
        assert_eq!(resp.request_id(), Some("r"));
        assert_eq!(resp.entity_id(), Some(&id));
    }

    #[test]
    fn confirmation_variant_names_follow_kind() {
        let id = EntityId::new();
        let make = |kind| {
            BusResponse::Confirmation(Confirmation {
                kind,
                request_id: "r".into(),
                entity_id: id.clone(),
                request_kind: RequestKind::InvokeWithoutEntity,
            })
        };
        assert_eq!(make(ConfirmationKind::Submitted).variant_name(), "Submitted");
        assert_eq!(make(ConfirmationKind::Committed).variant_name(), "Committed");
    }

    #[test]
    fn simple_workflow_name_strips_package() {
        let state = InvocationState {
            request_id: "r".into(),
            entity_id: EntityId::new(),
            parameters: FieldMap::new(),
            caller: party(),
            recipient: party(),
            workflow_name: "com.x.SimpleFlow".into(),
            transaction_hash: TransactionHash::ZERO,
        };
        assert_eq!(state.simple_workflow_name(), "SimpleFlow");
    }
}
