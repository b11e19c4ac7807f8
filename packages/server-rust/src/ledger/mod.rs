//! Ledger engine collaborator: submission, result retrieval and entity queries.
//!
//! The bridge never executes workflow logic itself. It hands a resolved
//! [`InvocableUnit`] to a [`LedgerEngine`], receives a handle as soon as the
//! engine has durably scheduled the work, and later awaits the committed
//! transaction through that handle.

pub mod memory;

use async_trait::async_trait;
use ledgerbridge_core::{flatten_with_dot_notation, EntityId, FieldMap, Party, TransactionHash};
use serde_json::Value;

use crate::resolver::InvocableUnit;

pub use memory::{InMemoryLedger, WorkflowContext};

/// Key under which an entity's own id appears in its state document.
pub const ENTITY_ID_FIELD: &str = "entityId";

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One output entity of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerOutput {
    /// `None` for outputs that are not linear (carry no stable id).
    pub entity_id: Option<EntityId>,
    pub state: Value,
    pub participants: Vec<Party>,
}

impl LedgerOutput {
    #[must_use]
    pub fn linear(entity_id: EntityId, state: Value, participants: Vec<Party>) -> Self {
        Self {
            entity_id: Some(entity_id),
            state,
            participants,
        }
    }
}

/// Raw outcome of a finished invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedTransaction {
    pub hash: Option<TransactionHash>,
    /// The party that ran the workflow.
    pub from: Party,
    pub outputs: Vec<LedgerOutput>,
}

/// Current view of a single entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityState {
    pub fields: FieldMap,
    /// `true` while the entity has never been superseded by a later version.
    pub is_new_entity: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("workflow failed: {0}")]
    WorkflowFailed(String),
    #[error("No entity with ID {0} found")]
    EntityNotFound(EntityId),
    #[error("invocation was abandoned before producing a result")]
    Abandoned,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Handle to a scheduled invocation.
#[async_trait]
pub trait InvocationHandle: Send {
    /// Waits for the invocation's terminal result.
    async fn await_result(self: Box<Self>) -> Result<CommittedTransaction, LedgerError>;
}

#[async_trait]
pub trait LedgerEngine: Send + Sync {
    /// Schedules `unit` for execution. Returning `Ok` means the work survives
    /// a bridge restart.
    async fn submit(&self, unit: InvocableUnit) -> Result<Box<dyn InvocationHandle>, LedgerError>;

    async fn query_entity(&self, entity_id: &EntityId) -> Result<EntityState, LedgerError>;
}

/// Flattens an entity's state document, leaving out its own id.
#[must_use]
pub fn entity_fields(state: &Value) -> FieldMap {
    match state {
        Value::Object(map) if map.contains_key(ENTITY_ID_FIELD) => {
            let without_id: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(k, _)| k.as_str() != ENTITY_ID_FIELD)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            flatten_with_dot_notation(&Value::Object(without_id))
        }
        other => flatten_with_dot_notation(other),
    }
}
