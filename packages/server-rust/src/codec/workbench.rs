//! JSON dialect spoken by workbench-style broker consumers.
//!
//! Ingress accepts `CreateContractRequest`, `CreateContractActionRequest` and
//! `ReadContractRequest`. The request id is read before anything else is
//! validated so that most malformed payloads still get a correlated reply.
//!
//! Egress renders every reply as tab-indented JSON with `\n` line endings and
//! a fixed key order.

use ledgerbridge_core::{
    BusRequest, BusResponse, Confirmation, EntityId, ErrorResponse, FieldMap, FlowOutput,
    InvocationState, InvokeWithEntity, InvokeWithoutEntity, QueryEntityState, RequestKind,
    StateOutput,
};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{json, Map, Serializer, Value};

use super::numeric::unsigned_number;
use super::{FormatError, WireCodec};

const SCHEMA_VERSION: &str = "1.0.0";

const CREATE_KEYS: &[&str] = &["requestId", "workflowName", "parameters", "messageSchemaVersion"];
const ACTION_KEYS: &[&str] = &[
    "requestId",
    "workflowFunctionName",
    "contractLedgerIdentifier",
    "parameters",
    "messageSchemaVersion",
];
const READ_KEYS: &[&str] = &["requestId", "contractLedgerIdentifier", "messageSchemaVersion"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkbenchCodec {
    connection_id: u32,
}

impl WorkbenchCodec {
    #[must_use]
    pub fn new(connection_id: u32) -> Self {
        Self { connection_id }
    }
}

impl Default for WorkbenchCodec {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WireCodec for WorkbenchCodec {
    fn decode(&self, payload: &str) -> Result<BusRequest, FormatError> {
        let node = parse(payload)?;
        let request_id = node
            .get("requestId")
            .and_then(Value::as_str)
            .ok_or_else(|| uncorrelated("Invalid request ID provided"))?
            .to_string();
        decode_request(&node).map_err(|message| FormatError::Correlatable {
            request_id,
            message,
        })
    }

    fn encode(&self, response: &BusResponse) -> serde_json::Result<String> {
        let value = match response {
            BusResponse::FlowOutput(output) => self.flow_output(output),
            BusResponse::StateOutput(output) => state_output(output),
            BusResponse::Confirmation(confirmation) => self.confirmation(confirmation),
            BusResponse::InvocationState(state) => self.invocation_state(state),
            BusResponse::Error(error) => self.error(error),
        };
        to_pretty_string(&value)
    }
}

// ---------------------------------------------------------------------------
// Ingress
// ---------------------------------------------------------------------------

fn uncorrelated(message: impl Into<String>) -> FormatError {
    FormatError::Uncorrelated {
        message: message.into(),
    }
}

fn parse(payload: &str) -> Result<Value, FormatError> {
    if payload.trim().is_empty() {
        return Err(uncorrelated("No ingress message presented"));
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Null) => Err(uncorrelated("No ingress message presented")),
        Ok(node) => Ok(node),
        Err(e) => Err(uncorrelated(e.to_string())),
    }
}

fn decode_request(node: &Value) -> Result<BusRequest, String> {
    match node.get("messageName").and_then(Value::as_str) {
        Some("CreateContractRequest") => {
            require(node, CREATE_KEYS)?;
            Ok(BusRequest::InvokeWithoutEntity(InvokeWithoutEntity {
                request_id: text(node, "requestId", "Invalid request ID provided")?,
                workflow_name: text(node, "workflowName", "Invalid workflow name provided")?,
                parameters: parameters(node)?,
            }))
        }
        Some("CreateContractActionRequest") => {
            require(node, ACTION_KEYS)?;
            Ok(BusRequest::InvokeWithEntity(InvokeWithEntity {
                request_id: text(node, "requestId", "Invalid request ID provided")?,
                entity_id: entity_id(node)?,
                workflow_name: text(node, "workflowFunctionName", "Invalid workflow name provided")?,
                parameters: parameters(node)?,
            }))
        }
        Some("ReadContractRequest") => {
            require(node, READ_KEYS)?;
            Ok(BusRequest::QueryEntityState(QueryEntityState {
                request_id: text(node, "requestId", "Invalid request ID provided")?,
                entity_id: entity_id(node)?,
            }))
        }
        _ => Err("Unknown message name".to_string()),
    }
}

/// Reports every absent key, in `keys` order.
fn require(node: &Value, keys: &[&str]) -> Result<(), String> {
    let violations: Vec<String> = keys
        .iter()
        .filter(|k| node.get(**k).is_none())
        .map(|k| format!("#: required key [{k}] not found"))
        .collect();
    match violations.len() {
        0 => Ok(()),
        1 => Err(violations.join("")),
        n => Err(format!(
            "{n} schema violations found: {}",
            violations.join(", ")
        )),
    }
}

fn text(node: &Value, key: &str, error: &str) -> Result<String, String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| error.to_string())
}

fn entity_id(node: &Value) -> Result<EntityId, String> {
    let raw = text(node, "contractLedgerIdentifier", "Invalid linear ID provided")?;
    raw.parse()
        .map_err(|_| "Invalid linear ID provided".to_string())
}

fn parameters(node: &Value) -> Result<FieldMap, String> {
    let entries = node
        .get("parameters")
        .and_then(Value::as_array)
        .ok_or_else(|| "No parameters provided".to_string())?;

    let mut parameters = FieldMap::new();
    for entry in entries {
        let entry = entry
            .as_object()
            .ok_or_else(|| "Malformed Parameter".to_string())?;
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| "Malformed Key".to_string())?;
        let value = entry
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| "Malformed Value".to_string())?;
        parameters.insert(name, value);
    }
    Ok(parameters)
}

// ---------------------------------------------------------------------------
// Egress
// ---------------------------------------------------------------------------

fn update_name(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::InvokeWithoutEntity => "CreateContractUpdate",
        RequestKind::InvokeWithEntity => "CreateContractActionUpdate",
        RequestKind::QueryEntityState => "ReadContractUpdate",
    }
}

fn contract_id(entity_id: &EntityId) -> Value {
    unsigned_number(entity_id.id.as_bytes())
}

fn contract_properties(fields: &FieldMap) -> Value {
    fields
        .iter()
        .map(|(name, value)| json!({"workflowPropertyId": null, "name": name, "value": value}))
        .collect()
}

fn state_output(output: &StateOutput) -> Value {
    json!({
        "messageName": "ContractMessage",
        "requestId": output.request_id,
        "additionalInformation": {},
        "contractLedgerIdentifier": output.entity_id.to_string(),
        "contractProperties": contract_properties(&output.fields),
        "messageSchemaVersion": SCHEMA_VERSION,
    })
}

impl WorkbenchCodec {
    fn flow_output(&self, output: &FlowOutput) -> Value {
        let hash = output.transaction_hash.to_prefixed_string();
        json!({
            "messageName": "ContractMessage",
            "blockId": null,
            "blockHash": hash,
            "requestId": output.request_id,
            "additionalInformation": {},
            "contractLedgerIdentifier": output.entity_id.to_string(),
            "contractProperties": contract_properties(&output.fields),
            "modifyingTransactions": [{
                "from": output.from_party.name(),
                "to": output.entity_id.to_string(),
                "transactionId": unsigned_number(output.transaction_hash.as_bytes()),
                "transactionHash": hash,
            }],
            "contractId": contract_id(&output.entity_id),
            "connectionId": self.connection_id,
            "messageSchemaVersion": SCHEMA_VERSION,
            "isNewContract": output.is_new_entity,
        })
    }

    fn confirmation(&self, confirmation: &Confirmation) -> Value {
        json!({
            "messageName": update_name(confirmation.request_kind),
            "additionalInformation": {},
            "requestId": confirmation.request_id,
            "contractId": contract_id(&confirmation.entity_id),
            "contractLedgerIdentifier": confirmation.entity_id.to_string(),
            "connectionId": self.connection_id,
            "messageSchemaVersion": SCHEMA_VERSION,
            "status": confirmation.kind.as_str(),
        })
    }

    fn invocation_state(&self, state: &InvocationState) -> Value {
        let parameters: Value = state
            .parameters
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect();
        json!({
            "messageName": "EventMessage",
            "eventName": "ContractFunctionInvocation",
            "requestId": state.request_id,
            "caller": {
                "type": "User",
                "id": unsigned_number(state.caller.name().as_bytes()),
                "ledgerIdentifier": state.caller.name(),
            },
            "additionalInformation": {},
            "contractId": contract_id(&state.entity_id),
            "contractLedgerIdentifier": state.entity_id.to_string(),
            "functionName": state.simple_workflow_name(),
            "parameters": parameters,
            "transaction": {
                "transactionId": unsigned_number(state.transaction_hash.as_bytes()),
                "transactionHash": state.transaction_hash.to_prefixed_string(),
                "from": state.caller.name(),
                "to": state.entity_id.to_string(),
                "recipient": state.recipient.name(),
            },
            "inTransactionSequenceNumber": null,
            "connectionId": self.connection_id,
            "messageSchemaVersion": SCHEMA_VERSION,
        })
    }

    fn error(&self, error: &ErrorResponse) -> Value {
        let mut node = Map::new();
        match error {
            ErrorResponse::Generic { request_id, .. } => {
                if let Some(id) = request_id {
                    node.insert("requestId".into(), json!(id));
                }
            }
            ErrorResponse::Correlatable { request_id, .. } => {
                node.insert("requestId".into(), json!(request_id));
            }
            ErrorResponse::Workflow {
                request_id,
                request_kind,
                entity_id,
                ..
            } => {
                node.insert("requestId".into(), json!(request_id));
                if let Some(id) = entity_id {
                    node.insert("contractId".into(), contract_id(id));
                }
                node.insert("connectionId".into(), json!(self.connection_id));
                node.insert("messageName".into(), json!(update_name(*request_kind)));
                if let Some(id) = entity_id {
                    node.insert("contractLedgerIdentifier".into(), json!(id.to_string()));
                }
            }
        }
        let cause = error.cause();
        node.insert(
            "additionalInformation".into(),
            json!({"errorCode": cause.error_code(), "errorMessage": cause.message}),
        );
        node.insert("status".into(), json!("Failure"));
        node.insert("messageSchemaVersion".into(), json!(SCHEMA_VERSION));
        Value::Object(node)
    }
}

/// Tab-indented rendering with `\n` line endings on every platform.
fn to_pretty_string(value: &Value) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(serde::ser::Error::custom)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
