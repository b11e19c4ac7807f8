//! Per-request state machine: resolve, submit, acknowledge, await, reply.
//!
//! Acknowledgment happens exactly once per request and at a fixed point:
//! - queries ack before the ledger is asked anything;
//! - invocations that fail to resolve or submit ack right away;
//! - accepted submissions ack as soon as the ledger returns a handle, before
//!   the result is awaited.
//!
//! Every failure becomes a single workflow error reply; nothing propagates.

use std::sync::Arc;
use std::time::Instant;

use ledgerbridge_core::{
    BusRequest, BusResponse, Confirmation, ConfirmationKind, EntityId, ErrorResponse, FieldMap,
    FlowOutput, InvocationState, QueryEntityState, RequestKind, StateOutput,
};
use tracing::{debug, info, info_span, warn, Instrument};

use super::config::ProcessorConfig;
use super::error::ProcessingError;
use super::outcome::derive_outcome;
use crate::bus::PendingAck;
use crate::ledger::LedgerEngine;
use crate::resolver::InvocationResolver;

/// Parameter through which an entity-bound workflow receives its entity id.
pub const ENTITY_ID_PARAMETER: &str = "entityId";

/// An invocation request with its kind-specific parts normalised.
struct Invocation {
    request_id: String,
    kind: RequestKind,
    workflow_name: String,
    /// Parameters as received.
    parameters: FieldMap,
    entity_id: Option<EntityId>,
}

impl Invocation {
    fn is_new_entity(&self) -> bool {
        self.kind == RequestKind::InvokeWithoutEntity
    }

    /// Parameters handed to the resolver, with the entity id injected.
    fn bound_parameters(&self) -> FieldMap {
        let mut parameters = self.parameters.clone();
        if let Some(id) = &self.entity_id {
            parameters.insert(ENTITY_ID_PARAMETER, id.to_string());
        }
        parameters
    }

    fn failed(&self, err: &ProcessingError) -> Vec<BusResponse> {
        workflow_error(&self.request_id, self.kind, err, self.entity_id.clone())
    }
}

fn workflow_error(
    request_id: &str,
    request_kind: RequestKind,
    err: &ProcessingError,
    entity_id: Option<EntityId>,
) -> Vec<BusResponse> {
    warn!(request_id, kind = %request_kind, error = %err, "request failed");
    vec![BusResponse::Error(ErrorResponse::Workflow {
        request_id: request_id.to_string(),
        request_kind,
        cause: err.cause(),
        entity_id,
    })]
}

// ---------------------------------------------------------------------------
// MessageProcessor
// ---------------------------------------------------------------------------

pub struct MessageProcessor {
    resolver: InvocationResolver,
    ledger: Arc<dyn LedgerEngine>,
    config: ProcessorConfig,
}

impl MessageProcessor {
    #[must_use]
    pub fn new(
        resolver: InvocationResolver,
        ledger: Arc<dyn LedgerEngine>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            resolver,
            ledger,
            config,
        }
    }

    /// Processes one request and returns its replies in send order.
    ///
    /// `ack` is consumed on every path.
    pub async fn process(&self, request: BusRequest, ack: PendingAck) -> Vec<BusResponse> {
        let kind = request.kind();
        metrics::counter!("ledgerbridge_requests_total", "kind" => kind.as_str()).increment(1);
        let span = info_span!(
            "request",
            request_id = %request.request_id(),
            kind = kind.as_str(),
            outcome = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let responses = match request {
                BusRequest::QueryEntityState(query) => self.query(query, ack).await,
                BusRequest::InvokeWithoutEntity(r) => {
                    self.invoke(
                        Invocation {
                            request_id: r.request_id,
                            kind,
                            workflow_name: r.workflow_name,
                            parameters: r.parameters,
                            entity_id: None,
                        },
                        ack,
                    )
                    .await
                }
                BusRequest::InvokeWithEntity(r) => {
                    self.invoke(
                        Invocation {
                            request_id: r.request_id,
                            kind,
                            workflow_name: r.workflow_name,
                            parameters: r.parameters,
                            entity_id: Some(r.entity_id),
                        },
                        ack,
                    )
                    .await
                }
            };

            let outcome = if responses.iter().any(BusResponse::is_error) {
                "error"
            } else {
                "ok"
            };
            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            info!(
                responses = responses.len(),
                duration_ms,
                outcome,
                "request complete"
            );
            responses
        }
        .instrument(span)
        .await
    }

    async fn query(&self, request: QueryEntityState, ack: PendingAck) -> Vec<BusResponse> {
        ack.complete().await;
        match self.ledger.query_entity(&request.entity_id).await {
            Ok(state) => vec![BusResponse::StateOutput(StateOutput {
                request_id: request.request_id,
                entity_id: request.entity_id,
                fields: state.fields,
                is_new_entity: state.is_new_entity,
            })],
            Err(e) => workflow_error(
                &request.request_id,
                RequestKind::QueryEntityState,
                &ProcessingError::Query(e),
                Some(request.entity_id),
            ),
        }
    }

    async fn invoke(&self, invocation: Invocation, ack: PendingAck) -> Vec<BusResponse> {
        let unit = match self
            .resolver
            .resolve(&invocation.workflow_name, &invocation.bound_parameters())
        {
            Ok(unit) => unit,
            Err(e) => {
                ack.complete().await;
                return invocation.failed(&e.into());
            }
        };
        let workflow_name = unit.workflow_name.clone();

        let handle = match self.ledger.submit(unit).await {
            Ok(handle) => handle,
            Err(e) => {
                ack.complete().await;
                return invocation.failed(&ProcessingError::Invocation(e));
            }
        };
        ack.complete().await;
        debug!(workflow = %workflow_name, "workflow submitted");

        let result = match self.config.invocation_timeout {
            Some(limit) => match tokio::time::timeout(limit, handle.await_result()).await {
                Ok(result) => result,
                Err(_) => return invocation.failed(&ProcessingError::Timeout(limit)),
            },
            None => handle.await_result().await,
        };
        let tx = match result {
            Ok(tx) => tx,
            Err(e) => return invocation.failed(&ProcessingError::Invocation(e)),
        };
        let outcome = match derive_outcome(tx) {
            Ok(outcome) => outcome,
            Err(e) => return invocation.failed(&e.into()),
        };

        let entity_id = outcome.entity_id.or_else(|| invocation.entity_id.clone());
        let (Some(entity_id), Some(hash)) = (entity_id, outcome.hash) else {
            return invocation.failed(&ProcessingError::IllegalState(
                "Unable to derive entity ID/transaction hash after workflow invocation"
                    .to_string(),
            ));
        };

        let mut responses = Vec::with_capacity(outcome.recipients.len() + 3);
        for recipient in &outcome.recipients {
            responses.push(BusResponse::InvocationState(InvocationState {
                request_id: invocation.request_id.clone(),
                entity_id: entity_id.clone(),
                parameters: invocation.parameters.clone(),
                caller: outcome.from.clone(),
                recipient: recipient.clone(),
                workflow_name: workflow_name.clone(),
                transaction_hash: hash,
            }));
        }
        responses.push(BusResponse::FlowOutput(FlowOutput {
            request_id: invocation.request_id.clone(),
            entity_id: entity_id.clone(),
            fields: outcome.fields,
            is_new_entity: invocation.is_new_entity(),
            from_party: outcome.from,
            to_parties: outcome.recipients,
            transaction_hash: hash,
        }));
        for kind in [ConfirmationKind::Committed, ConfirmationKind::Submitted] {
            responses.push(BusResponse::Confirmation(Confirmation {
                kind,
                request_id: invocation.request_id.clone(),
                entity_id: entity_id.clone(),
                request_kind: invocation.kind,
            }));
        }
        responses
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
