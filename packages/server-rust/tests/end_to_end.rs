//! Drives a started bridge over the in-memory broker and ledger, from raw
//! inbound JSON to raw outbound JSON.

use std::sync::Arc;
use std::time::Duration;

use ledgerbridge_core::{ConstructorSchema, EntityId, ParamDef, ParamType, Party};
use ledgerbridge_server::bus::{BusConfig, InMemoryBroker, RetryConfig, TransportError};
use ledgerbridge_server::codec::WorkbenchCodec;
use ledgerbridge_server::ledger::{InMemoryLedger, LedgerOutput};
use ledgerbridge_server::processing::ProcessorConfig;
use ledgerbridge_server::resolver::{WorkflowDefinition, WorkflowRegistry};
use ledgerbridge_server::Bridge;
use parking_lot::Mutex;
use serde_json::{json, Value};

const NODE: &str = "O=Member 1, L=London, C=GB";
const MEMBER_2: &str = "O=Member 2, L=Manchester, C=GB";
const MEMBER_3: &str = "O=Member 3, L=Leeds, C=GB";
const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    broker: InMemoryBroker,
    ledger: InMemoryLedger,
    bridge: Bridge,
    fatal: Arc<Mutex<Vec<TransportError>>>,
}

fn party(name: &str) -> Party {
    name.parse().unwrap()
}

fn registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry.register(WorkflowDefinition::new(
        "com.x.SimpleFlow",
        vec![ConstructorSchema::empty()],
    ));
    registry.register(WorkflowDefinition::new(
        "com.x.SimpleFlowWithInput",
        vec![ConstructorSchema::new(vec![
            ParamDef::new("a", ParamType::String),
            ParamDef::new("b", ParamType::Int),
        ])],
    ));
    registry.register(WorkflowDefinition::new(
        "com.x.ShareFlow",
        vec![ConstructorSchema::new(vec![
            ParamDef::new("first", ParamType::Party),
            ParamDef::new("second", ParamType::Party),
        ])],
    ));
    registry.register(WorkflowDefinition::new(
        "com.x.TouchFlow",
        vec![ConstructorSchema::new(vec![ParamDef::new(
            "entityId",
            ParamType::EntityId,
        )])],
    ));
    registry.register(WorkflowDefinition::new(
        "com.x.FailingFlow",
        vec![ConstructorSchema::new(vec![ParamDef::new(
            "entityId",
            ParamType::EntityId,
        )])],
    ));
    registry
}

fn ledger() -> InMemoryLedger {
    let ledger = InMemoryLedger::new(party(NODE));
    ledger.install("com.x.SimpleFlow", |ctx| {
        let id = EntityId::new();
        Ok(vec![LedgerOutput::linear(
            id.clone(),
            json!({"entityId": id.to_string()}),
            vec![ctx.local_party().clone()],
        )])
    });
    ledger.install("com.x.ShareFlow", |ctx| {
        let mut participants = vec![ctx.local_party().clone()];
        for name in ["first", "second"] {
            let p = ctx
                .argument(name)
                .and_then(|a| a.as_party())
                .ok_or("missing party")?;
            participants.push(p.clone());
        }
        let id = EntityId::new();
        Ok(vec![LedgerOutput::linear(
            id.clone(),
            json!({"entityId": id.to_string(), "shared": true}),
            participants,
        )])
    });
    ledger.install("com.x.TouchFlow", |ctx| {
        let id = ctx
            .argument("entityId")
            .and_then(|a| a.as_entity_id())
            .cloned()
            .ok_or("missing entity")?;
        let touches = ctx
            .current_state(&id)
            .and_then(|s| s["touches"].as_i64())
            .unwrap_or(0);
        Ok(vec![LedgerOutput::linear(
            id.clone(),
            json!({"entityId": id.to_string(), "touches": touches + 1}),
            vec![ctx.local_party().clone()],
        )])
    });
    ledger.install("com.x.FailingFlow", |_| Err("Boooom!".to_string()));
    ledger
}

async fn start() -> Harness {
    let broker = InMemoryBroker::new();
    let ledger = ledger();
    let fatal = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&fatal);

    let bridge = Bridge::start(
        BusConfig {
            connection_string: "memory://local".into(),
            retry: RetryConfig {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(40),
            },
            receive_wait: Duration::from_millis(50),
            ..BusConfig::default()
        },
        ProcessorConfig::default(),
        Arc::new(WorkbenchCodec::default()),
        Arc::new(registry()),
        Arc::new(ledger.clone()),
        Arc::new(broker.clone()),
        Arc::new(move |e: &TransportError| recorder.lock().push(e.clone())),
    )
    .unwrap();
    bridge.wait_until_ready().await;

    Harness {
        broker,
        ledger,
        bridge,
        fatal,
    }
}

impl Harness {
    async fn exchange(&self, request: &Value, expected_replies: usize) -> Vec<Value> {
        self.broker.publish("inbound", request.to_string());
        let replies = self
            .broker
            .wait_for_messages("outbound", expected_replies, WAIT)
            .await;
        replies
            .iter()
            .map(|r| serde_json::from_str(r).unwrap())
            .collect()
    }

    /// Every delivery was completed: nothing waits and nothing is locked.
    fn assert_inbound_settled(&self) {
        assert_eq!(self.broker.ready_count("inbound"), 0);
        assert_eq!(self.broker.locked_count("inbound"), 0);
    }

    async fn stop(self) {
        assert!(self.bridge.shutdown(WAIT).await.unwrap());
        assert!(self.fatal.lock().is_empty());
    }
}

fn create(request_id: &str, workflow: &str, params: &[(&str, &str)]) -> Value {
    json!({
        "messageName": "CreateContractRequest",
        "requestId": request_id,
        "workflowName": workflow,
        "parameters": params
            .iter()
            .map(|(n, v)| json!({"name": n, "value": v}))
            .collect::<Vec<_>>(),
        "messageSchemaVersion": "1.0.0",
    })
}

fn action(request_id: &str, entity: &str, workflow: &str) -> Value {
    json!({
        "messageName": "CreateContractActionRequest",
        "requestId": request_id,
        "contractLedgerIdentifier": entity,
        "workflowFunctionName": workflow,
        "parameters": [],
        "messageSchemaVersion": "1.0.0",
    })
}

fn read(request_id: &str, entity: &str) -> Value {
    json!({
        "messageName": "ReadContractRequest",
        "requestId": request_id,
        "contractLedgerIdentifier": entity,
        "messageSchemaVersion": "1.0.0",
    })
}

fn error_message(reply: &Value) -> &str {
    reply["additionalInformation"]["errorMessage"]
        .as_str()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_argument_workflow_commits() {
    let h = start().await;

    let replies = h.exchange(&create("1234", "com.x.SimpleFlow", &[]), 3).await;

    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["messageName"], "ContractMessage");
    assert_eq!(replies[0]["contractProperties"], json!([]));
    assert_eq!(replies[0]["isNewContract"], true);
    assert_eq!(replies[1]["status"], "Committed");
    assert_eq!(replies[2]["status"], "Submitted");
    assert!(replies.iter().all(|r| r["requestId"] == "1234"));
    h.assert_inbound_settled();
    h.stop().await;
}

#[tokio::test]
async fn unknown_workflow_class_fails_once() {
    let h = start().await;

    let replies = h
        .exchange(&create("r-b", "com.nowhere.SimpleFlow", &[]), 1)
        .await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["status"], "Failure");
    assert_eq!(replies[0]["messageName"], "CreateContractUpdate");
    assert!(error_message(&replies[0]).contains("com.nowhere.SimpleFlow"));
    assert_eq!(h.ledger.submission_count(), 0);
    h.assert_inbound_settled();
    h.stop().await;
}

#[tokio::test]
async fn uncoercible_parameter_reports_every_constructor() {
    let h = start().await;

    let replies = h
        .exchange(
            &create("r-c", "SimpleFlowWithInput", &[("a", "x"), ("b", "a123")]),
            1,
        )
        .await;

    assert_eq!(replies.len(), 1);
    let message = error_message(&replies[0]);
    assert!(message.contains("parameter b"), "{message}");
    assert!(message.contains("a123"), "{message}");
    h.assert_inbound_settled();
    h.stop().await;
}

#[tokio::test]
async fn query_returns_current_state() {
    let h = start().await;

    let created = h.exchange(&create("c1", "SimpleFlow", &[]), 3).await;
    let entity = created[0]["contractLedgerIdentifier"]
        .as_str()
        .unwrap()
        .to_string();
    h.exchange(&action("t1", &entity, "TouchFlow"), 3).await;

    let replies = h.exchange(&read("q1", &entity), 1).await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["messageName"], "ContractMessage");
    assert_eq!(replies[0]["requestId"], "q1");
    assert_eq!(replies[0]["contractLedgerIdentifier"], entity.as_str());
    assert_eq!(
        replies[0]["contractProperties"],
        json!([{"workflowPropertyId": null, "name": "touches", "value": "1"}])
    );
    h.assert_inbound_settled();
    h.stop().await;
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_reply_is_correlated() {
    let h = start().await;

    for (id, request, count) in [
        ("p-1", create("p-1", "SimpleFlow", &[]), 3),
        ("p-2", create("p-2", "NoSuchFlow", &[]), 1),
        ("p-3", read("p-3", &EntityId::new().to_string()), 1),
        (
            "p-4",
            json!({"requestId": "p-4", "messageName": "CreateContractRequest"}),
            1,
        ),
    ] {
        let replies = h.exchange(&request, count).await;
        assert_eq!(replies.len(), count, "{id}");
        assert!(replies.iter().all(|r| r["requestId"] == id), "{id}");
    }
    h.assert_inbound_settled();
    h.stop().await;
}

#[tokio::test]
async fn failed_action_threads_the_request_entity_id() {
    let h = start().await;
    let entity = EntityId::with_external_id("order-7").to_string();

    let replies = h.exchange(&action("p2", &entity, "FailingFlow"), 1).await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["messageName"], "CreateContractActionUpdate");
    assert_eq!(replies[0]["contractLedgerIdentifier"], entity.as_str());
    assert!(error_message(&replies[0]).contains("Boooom!"));
    h.assert_inbound_settled();
    h.stop().await;
}

#[tokio::test]
async fn fan_out_has_one_event_per_recipient() {
    let h = start().await;

    let replies = h
        .exchange(
            &create(
                "p3",
                "ShareFlow",
                &[("first", MEMBER_2), ("second", MEMBER_3)],
            ),
            5,
        )
        .await;

    assert_eq!(replies.len(), 5);
    let recipients: Vec<_> = replies[..2]
        .iter()
        .map(|r| r["transaction"]["recipient"].as_str().unwrap())
        .collect();
    assert_eq!(recipients, vec![MEMBER_2, MEMBER_3]);
    assert!(replies[..2]
        .iter()
        .all(|r| r["messageName"] == "EventMessage" && r["caller"]["ledgerIdentifier"] == NODE));
    assert_eq!(replies[2]["messageName"], "ContractMessage");
    assert_eq!(replies[3]["status"], "Committed");
    assert_eq!(replies[4]["status"], "Submitted");
    h.stop().await;
}

#[tokio::test]
async fn every_branch_completes_its_delivery() {
    let h = start().await;

    h.exchange(&create("a", "SimpleFlow", &[]), 3).await;
    h.exchange(&create("b", "NoSuchFlow", &[]), 1).await;
    h.exchange(&action("c", &EntityId::new().to_string(), "FailingFlow"), 1)
        .await;
    h.exchange(&read("d", &EntityId::new().to_string()), 1).await;
    h.broker.publish("inbound", "not json at all");
    h.broker.wait_for_messages("outbound", 1, WAIT).await;

    h.ledger.set_accepting(false);
    let rejected = h.exchange(&create("e", "SimpleFlow", &[]), 1).await;
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["status"], "Failure");

    h.assert_inbound_settled();
    assert_eq!(h.broker.abandon_locked("inbound"), 0);
    h.stop().await;
}

// ---------------------------------------------------------------------------
// Broker resilience
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_open_failures_are_retried() {
    let broker = InMemoryBroker::new();
    broker.fail_next_opens(3);
    let fatal = Arc::new(Mutex::new(Vec::<TransportError>::new()));
    let recorder = Arc::clone(&fatal);

    let bridge = Bridge::start(
        BusConfig {
            connection_string: "memory://local".into(),
            retry: RetryConfig {
                max_attempts: 10,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(20),
            },
            ..BusConfig::default()
        },
        ProcessorConfig::default(),
        Arc::new(WorkbenchCodec::default()),
        Arc::new(registry()),
        Arc::new(ledger()),
        Arc::new(broker.clone()),
        Arc::new(move |e: &TransportError| recorder.lock().push(e.clone())),
    )
    .unwrap();
    tokio::time::timeout(WAIT, bridge.wait_until_ready())
        .await
        .unwrap();

    broker.publish("inbound", create("late", "SimpleFlow", &[]).to_string());
    assert_eq!(broker.wait_for_messages("outbound", 3, WAIT).await.len(), 3);
    assert!(fatal.lock().is_empty());
    bridge.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_are_fatal() {
    let broker = InMemoryBroker::new();
    broker.reject_opens(true);
    let fatal = Arc::new(Mutex::new(Vec::<TransportError>::new()));
    let recorder = Arc::clone(&fatal);

    let bridge = Bridge::start(
        BusConfig {
            connection_string: "memory://local".into(),
            ..BusConfig::default()
        },
        ProcessorConfig::default(),
        Arc::new(WorkbenchCodec::default()),
        Arc::new(registry()),
        Arc::new(ledger()),
        Arc::new(broker.clone()),
        Arc::new(move |e: &TransportError| recorder.lock().push(e.clone())),
    )
    .unwrap();

    tokio::time::timeout(WAIT, async {
        while fatal.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(!fatal.lock()[0].is_transient());
    bridge.shutdown(WAIT).await.unwrap();
}
