//! Reduces a committed transaction to what the replies need.

use ledgerbridge_core::{EntityId, FieldMap, Party, TransactionHash};

use crate::ledger::{entity_fields, CommittedTransaction};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    #[error("Only workflows with at most a single output entity are supported")]
    MultipleOutputs { count: usize },
    #[error("Only linear output entities are supported")]
    NonLinearOutput,
}

/// What a successful invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    /// Id of the single output entity, if there was one.
    pub entity_id: Option<EntityId>,
    /// Flattened output state without its `entityId` key.
    pub fields: FieldMap,
    pub hash: Option<TransactionHash>,
    /// The invoking party.
    pub from: Party,
    /// Output participants other than the invoking party.
    pub recipients: Vec<Party>,
}

/// # Errors
///
/// Fails when the transaction has more than one output, or its output has no
/// entity id.
pub fn derive_outcome(tx: CommittedTransaction) -> Result<InvocationOutcome, DerivationError> {
    let CommittedTransaction { hash, from, outputs } = tx;
    if outputs.len() > 1 {
        return Err(DerivationError::MultipleOutputs {
            count: outputs.len(),
        });
    }

    let Some(output) = outputs.into_iter().next() else {
        return Ok(InvocationOutcome {
            entity_id: None,
            fields: FieldMap::new(),
            hash,
            from,
            recipients: Vec::new(),
        });
    };

    let entity_id = output.entity_id.ok_or(DerivationError::NonLinearOutput)?;
    let mut recipients: Vec<Party> = Vec::with_capacity(output.participants.len());
    for party in output.participants {
        if party != from && !recipients.contains(&party) {
            recipients.push(party);
        }
    }

    Ok(InvocationOutcome {
        entity_id: Some(entity_id),
        fields: entity_fields(&output.state),
        hash,
        from,
        recipients,
    })
}
