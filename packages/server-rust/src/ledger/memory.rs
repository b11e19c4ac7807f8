//! In-process ledger engine.
//!
//! Workflows are plain closures installed under a qualified name. Each
//! submission runs on its own tokio task; committed outputs are appended to a
//! per-entity version history and every transaction gets a SHA-256 hash.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use ledgerbridge_core::{ArgValue, EntityId, Party, TransactionHash};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    entity_fields, CommittedTransaction, EntityState, InvocationHandle, LedgerEngine, LedgerError,
    LedgerOutput,
};
use crate::resolver::InvocableUnit;

type WorkflowBody =
    Arc<dyn Fn(&WorkflowContext<'_>) -> Result<Vec<LedgerOutput>, String> + Send + Sync>;

// ---------------------------------------------------------------------------
// WorkflowContext
// ---------------------------------------------------------------------------

/// What a workflow body can see while it runs.
pub struct WorkflowContext<'a> {
    unit: &'a InvocableUnit,
    store: &'a LedgerStore,
}

impl WorkflowContext<'_> {
    #[must_use]
    pub fn unit(&self) -> &InvocableUnit {
        self.unit
    }

    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&ArgValue> {
        self.unit.argument(name)
    }

    /// The node's own identity; the invoking party of every transaction.
    #[must_use]
    pub fn local_party(&self) -> &Party {
        &self.store.local_party
    }

    /// Latest committed state of an entity.
    #[must_use]
    pub fn current_state(&self, entity_id: &EntityId) -> Option<Value> {
        self.store.current_state(entity_id)
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

struct EntityRecord {
    versions: Vec<Value>,
}

struct LedgerStore {
    local_party: Party,
    workflows: DashMap<String, WorkflowBody>,
    entities: DashMap<Uuid, EntityRecord>,
    sequence: AtomicU64,
    submissions: AtomicU64,
    accepting: AtomicBool,
    latency_ms: AtomicU64,
}

impl LedgerStore {
    fn current_state(&self, entity_id: &EntityId) -> Option<Value> {
        self.entities
            .get(&entity_id.id)
            .and_then(|record| record.versions.last().cloned())
    }

    fn execute(
        &self,
        unit: &InvocableUnit,
        body: &WorkflowBody,
    ) -> Result<CommittedTransaction, LedgerError> {
        let ctx = WorkflowContext { unit, store: self };
        let outputs = (body.as_ref())(&ctx).map_err(LedgerError::WorkflowFailed)?;

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(unit.workflow_name.as_bytes());
        hasher.update(seq.to_be_bytes());
        for (name, value) in &unit.arguments {
            hasher.update(name.as_bytes());
            hasher.update(value.to_json().to_string().as_bytes());
        }
        for output in &outputs {
            hasher.update(output.state.to_string().as_bytes());
        }
        let digest: [u8; 32] = hasher.finalize().into();

        for output in &outputs {
            if let Some(id) = &output.entity_id {
                self.entities
                    .entry(id.id)
                    .or_insert_with(|| EntityRecord {
                        versions: Vec::new(),
                    })
                    .versions
                    .push(output.state.clone());
            }
        }

        Ok(CommittedTransaction {
            hash: Some(TransactionHash::from_bytes(digest)),
            from: self.local_party.clone(),
            outputs,
        })
    }
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

/// Cloneable handle to a shared in-memory ledger.
#[derive(Clone)]
pub struct InMemoryLedger {
    store: Arc<LedgerStore>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new(local_party: Party) -> Self {
        Self {
            store: Arc::new(LedgerStore {
                local_party,
                workflows: DashMap::new(),
                entities: DashMap::new(),
                sequence: AtomicU64::new(0),
                submissions: AtomicU64::new(0),
                accepting: AtomicBool::new(true),
                latency_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Installs (or replaces) the body run for `qualified_name`.
    pub fn install<F>(&self, qualified_name: impl Into<String>, body: F)
    where
        F: Fn(&WorkflowContext<'_>) -> Result<Vec<LedgerOutput>, String> + Send + Sync + 'static,
    {
        self.store
            .workflows
            .insert(qualified_name.into(), Arc::new(body));
    }

    /// When `false`, every submission fails with [`LedgerError::Unavailable`].
    pub fn set_accepting(&self, accepting: bool) {
        self.store.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Delay applied before each workflow body runs.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.store.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of accepted submissions so far.
    #[must_use]
    pub fn submission_count(&self) -> u64 {
        self.store.submissions.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn local_party(&self) -> &Party {
        &self.store.local_party
    }

    #[must_use]
    pub fn current_state(&self, entity_id: &EntityId) -> Option<Value> {
        self.store.current_state(entity_id)
    }

    #[must_use]
    pub fn version_count(&self, entity_id: &EntityId) -> usize {
        self.store
            .entities
            .get(&entity_id.id)
            .map_or(0, |record| record.versions.len())
    }
}

struct InMemoryHandle {
    rx: oneshot::Receiver<Result<CommittedTransaction, LedgerError>>,
}

#[async_trait]
impl InvocationHandle for InMemoryHandle {
    async fn await_result(self: Box<Self>) -> Result<CommittedTransaction, LedgerError> {
        self.rx.await.unwrap_or(Err(LedgerError::Abandoned))
    }
}

#[async_trait]
impl LedgerEngine for InMemoryLedger {
    async fn submit(&self, unit: InvocableUnit) -> Result<Box<dyn InvocationHandle>, LedgerError> {
        if !self.store.accepting.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(
                "ledger is not accepting submissions".to_string(),
            ));
        }
        let body = self
            .store
            .workflows
            .get(&unit.workflow_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                LedgerError::Rejected(format!(
                    "no workflow named '{}' is installed",
                    unit.workflow_name
                ))
            })?;

        self.store.submissions.fetch_add(1, Ordering::SeqCst);
        let latency = Duration::from_millis(self.store.latency_ms.load(Ordering::SeqCst));
        let store = Arc::clone(&self.store);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let result = store.execute(&unit, &body);
            match &result {
                Ok(tx_result) => debug!(
                    workflow = %unit.workflow_name,
                    outputs = tx_result.outputs.len(),
                    "workflow committed"
                ),
                Err(e) => warn!(workflow = %unit.workflow_name, error = %e, "workflow failed"),
            }
            let _ = tx.send(result);
        });

        Ok(Box::new(InMemoryHandle { rx }))
    }

    async fn query_entity(&self, entity_id: &EntityId) -> Result<EntityState, LedgerError> {
        let record = self
            .store
            .entities
            .get(&entity_id.id)
            .ok_or_else(|| LedgerError::EntityNotFound(entity_id.clone()))?;
        let latest = record
            .versions
            .last()
            .ok_or_else(|| LedgerError::EntityNotFound(entity_id.clone()))?;
        Ok(EntityState {
            fields: entity_fields(latest),
            is_new_entity: record.versions.len() == 1,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
