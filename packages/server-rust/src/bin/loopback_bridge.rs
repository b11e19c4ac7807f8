//! Runs the bridge against the in-memory broker and ledger.
//!
//! Every stdin line is published to the inbound queue; every reply on the
//! outbound queue is printed to stdout.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ledgerbridge_core::{ConstructorSchema, EntityId, ParamDef, ParamType, Party};
use ledgerbridge_server::bus::{exit_process, InMemoryBroker};
use ledgerbridge_server::codec::WorkbenchCodec;
use ledgerbridge_server::ledger::{InMemoryLedger, LedgerOutput, WorkflowContext};
use ledgerbridge_server::logging::init_tracing;
use ledgerbridge_server::resolver::{WorkflowDefinition, WorkflowRegistry};
use ledgerbridge_server::{Bridge, BridgeConfig};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const NODE: &str = "O=Loopback Node, L=London, C=GB";
const CREATE: &str = "demo.shipment.CreateShipment";
const UPDATE: &str = "demo.shipment.UpdateStatus";

fn registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry.register(WorkflowDefinition::new(
        CREATE,
        vec![
            ConstructorSchema::new(vec![
                ParamDef::new("owner", ParamType::String),
                ParamDef::new("counterparty", ParamType::Party),
            ]),
            ConstructorSchema::new(vec![ParamDef::new("owner", ParamType::String)]),
        ],
    ));
    registry.register(WorkflowDefinition::new(
        UPDATE,
        vec![ConstructorSchema::new(vec![
            ParamDef::new("entityId", ParamType::EntityId),
            ParamDef::new("status", ParamType::String),
        ])],
    ));
    registry
}

fn create_shipment(ctx: &WorkflowContext<'_>) -> Result<Vec<LedgerOutput>, String> {
    let owner = ctx
        .argument("owner")
        .and_then(|a| a.as_str())
        .ok_or("owner is required")?;
    let mut participants = vec![ctx.local_party().clone()];
    if let Some(counterparty) = ctx.argument("counterparty").and_then(|a| a.as_party()) {
        participants.push(counterparty.clone());
    }
    let id = EntityId::new();
    Ok(vec![LedgerOutput::linear(
        id.clone(),
        json!({"entityId": id.to_string(), "owner": owner, "status": "Created"}),
        participants,
    )])
}

fn update_status(ctx: &WorkflowContext<'_>) -> Result<Vec<LedgerOutput>, String> {
    let id = ctx
        .argument("entityId")
        .and_then(|a| a.as_entity_id())
        .ok_or("entityId is required")?
        .clone();
    let status = ctx
        .argument("status")
        .and_then(|a| a.as_str())
        .ok_or("status is required")?;
    let mut state = ctx
        .current_state(&id)
        .ok_or_else(|| format!("no shipment {id}"))?;
    if let Value::Object(map) = &mut state {
        map.insert("status".into(), json!(status));
    }
    Ok(vec![LedgerOutput::linear(
        id,
        state,
        vec![ctx.local_party().clone()],
    )])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::parse();
    init_tracing(config.log_format)?;
    info!(?config, "starting loopback bridge");

    let node: Party = NODE.parse()?;
    let ledger = InMemoryLedger::new(node);
    ledger.install(CREATE, create_shipment);
    ledger.install(UPDATE, update_status);

    let broker = InMemoryBroker::new();
    let bus = config.bus_config();
    let inbound = bus.inbound_queue.clone();
    let outbound = bus.outbound_queue.clone();

    let bridge = Bridge::start(
        bus,
        config.processor_config(),
        Arc::new(WorkbenchCodec::new(config.connection_id)),
        Arc::new(registry()),
        Arc::new(ledger),
        Arc::new(broker.clone()),
        exit_process(),
    )?;
    bridge.wait_until_ready().await;

    let printer = {
        let broker = broker.clone();
        tokio::spawn(async move {
            loop {
                for reply in broker
                    .wait_for_messages(&outbound, 1, Duration::from_millis(100))
                    .await
                {
                    println!("{reply}");
                }
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => broker.publish(&inbound, line),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Let queued requests finish before draining.
    while broker.ready_count(&inbound) + broker.locked_count(&inbound) > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bridge.shutdown(Duration::from_secs(30)).await?;
    tokio::time::sleep(Duration::from_millis(150)).await;
    printer.abort();
    Ok(())
}
