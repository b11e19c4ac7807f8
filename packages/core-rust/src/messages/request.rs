//! Inbound requests decoded from broker payloads.

use serde::{Deserialize, Serialize};

use crate::fields::FieldMap;
use crate::types::EntityId;

use super::RequestKind;

/// Create a new entity by running a workflow with no input entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeWithoutEntity {
    pub request_id: String,
    pub workflow_name: String,
    pub parameters: FieldMap,
}

/// Run a workflow against an existing entity. The entity id is injected into
/// the workflow's parameters under `entityId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeWithEntity {
    pub request_id: String,
    pub entity_id: EntityId,
    pub workflow_name: String,
    pub parameters: FieldMap,
}

/// Read the current state of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEntityState {
    pub request_id: String,
    pub entity_id: EntityId,
}

/// A workflow invocation or state query received from the broker.
///
/// `request_id` is an opaque correlation string. It is copied verbatim onto
/// every response and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusRequest {
    InvokeWithoutEntity(InvokeWithoutEntity),
    InvokeWithEntity(InvokeWithEntity),
    QueryEntityState(QueryEntityState),
}

impl BusRequest {
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::InvokeWithoutEntity(r) => &r.request_id,
            Self::InvokeWithEntity(r) => &r.request_id,
            Self::QueryEntityState(r) => &r.request_id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::InvokeWithoutEntity(_) => RequestKind::InvokeWithoutEntity,
            Self::InvokeWithEntity(_) => RequestKind::InvokeWithEntity,
            Self::QueryEntityState(_) => RequestKind::QueryEntityState,
        }
    }

    /// The entity id supplied on the request, if any.
    #[must_use]
    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::InvokeWithoutEntity(_) => None,
            Self::InvokeWithEntity(r) => Some(&r.entity_id),
            Self::QueryEntityState(r) => Some(&r.entity_id),
        }
    }
}

impl From<InvokeWithoutEntity> for BusRequest {
    fn from(r: InvokeWithoutEntity) -> Self {
        Self::InvokeWithoutEntity(r)
    }
}

impl From<InvokeWithEntity> for BusRequest {
    fn from(r: InvokeWithEntity) -> Self {
        Self::InvokeWithEntity(r)
    }
}

impl From<QueryEntityState> for BusRequest {
    fn from(r: QueryEntityState) -> Self {
        Self::QueryEntityState(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_cover_every_variant() {
        let id = EntityId::new();
        let create: BusRequest = InvokeWithoutEntity {
            request_id: "r1".into(),
            workflow_name: "SimpleFlow".into(),
            parameters: FieldMap::new(),
        }
        .into();
        let action: BusRequest = InvokeWithEntity {
            request_id: "r2".into(),
            entity_id: id.clone(),
            workflow_name: "SimpleFlow".into(),
            parameters: FieldMap::new(),
        }
        .into();
        let query: BusRequest = QueryEntityState {
            request_id: "r3".into(),
            entity_id: id.clone(),
        }
        .into();

        assert_eq!(create.request_id(), "r1");
        assert_eq!(create.kind(), RequestKind::InvokeWithoutEntity);
        assert_eq!(create.entity_id(), None);
        assert_eq!(action.kind(), RequestKind::InvokeWithEntity);
        assert_eq!(action.entity_id(), Some(&id));
        assert_eq!(query.request_id(), "r3");
        assert_eq!(query.kind(), RequestKind::QueryEntityState);
    }

    #[test]
    fn serializes_with_type_tag() {
        let req: BusRequest = QueryEntityState {
            request_id: "q1".into(),
            entity_id: "f1a27656-3b1a-4469-8e37-04d9e2764bf6".parse().unwrap(),
        }
        .into();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "QueryEntityState");
        assert_eq!(json["requestId"], "q1");
        assert_eq!(json["entityId"], "f1a27656-3b1a-4469-8e37-04d9e2764bf6");
    }
}
