//! Discovery and introspection endpoints.
//!
//! Everything an agent needs to find, price, and verify this gateway: the
//! agent card, the service catalogue, machine-readable bazaar and chain
//! metadata, a compatibility matrix, and a live conformance self-test.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::catalog::{self, NETWORKS, SKILLS};
use crate::models::AppState;
use crate::requirements::{self, EXT_PAYMENT_CONFIG, EXT_X402_V01, EXT_X402_V02};
use crate::routes::rpc::{
    CODE_INVALID_PARAMS, CODE_INVALID_REQUEST, CODE_METHOD_NOT_FOUND, CODE_TASK_NOT_FOUND,
};
use crate::store::events::EventKind;
use crate::types::{PaymentStatus, TaskState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/agent-card.json", get(agent_card))
        .route("/x402", get(service_catalog))
        .route("/x402/bazaar", get(bazaar))
        .route("/x402/chains", get(chains))
        .route("/a2a-x402-compat", get(compatibility))
        .route("/a2a-x402-test", get(self_test))
        .with_state(state)
}

async fn agent_card(State(state): State<AppState>) -> Json<Value> {
    let skills: Vec<Value> = SKILLS
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "description": s.description,
                "inputModes": s.input_modes,
                "outputModes": s.output_modes,
                "price": catalog::price_display(s.price_smallest_unit),
                "priceSmallestUnit": s.price_smallest_unit.to_string(),
            })
        })
        .collect();

    Json(json!({
        "name": "Paygate",
        "description": "Pay-per-request agent gateway: skills priced in USDC over A2A and HTTP 402",
        "url": state.config.server.public_url,
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": {
            "streaming": false,
            "pushNotifications": false,
            "extensions": [
                { "uri": EXT_X402_V01, "required": false },
                { "uri": EXT_X402_V02, "required": false },
                {
                    "uri": EXT_PAYMENT_CONFIG,
                    "required": false,
                    "params": { "networks": NETWORKS, "payTo": state.config.payment.payee_address },
                },
            ],
        },
        "defaultInputModes": ["text/plain"],
        "defaultOutputModes": ["text/html", "application/json"],
        "skills": skills,
    }))
}

async fn service_catalog(State(state): State<AppState>) -> Json<Value> {
    let services: Vec<Value> = SKILLS
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "price": catalog::price_display(s.price_smallest_unit),
                "free": !s.requires_payment(),
                "endpoint": format!("{}/x402/{}", state.config.server.public_url, s.id),
            })
        })
        .collect();
    Json(json!({
        "service": "paygate",
        "version": env!("CARGO_PKG_VERSION"),
        "services": services,
        "networks": NETWORKS.iter().map(|n| n.caip2_id).collect::<Vec<_>>(),
    }))
}

async fn bazaar(State(state): State<AppState>) -> Json<Value> {
    let chains: Vec<&str> = NETWORKS.iter().map(|n| n.caip2_id).collect();
    let services: Vec<Value> = SKILLS
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "description": s.description,
                "price": catalog::price_display(s.price_smallest_unit),
                "priceSmallestUnit": s.price_smallest_unit.to_string(),
                "input": input_schema(s.id),
                "output": s.output_modes.first().copied().unwrap_or("text/plain"),
                "chains": chains.clone(),
                "endpoints": {
                    "rest": format!("{}/x402/{}", state.config.server.public_url, s.id),
                    "jsonrpc": state.config.server.public_url.clone(),
                },
            })
        })
        .collect();
    Json(json!({ "services": services }))
}

fn input_schema(skill_id: &str) -> Value {
    let (field, description) = match skill_id {
        "screenshot" => ("url", "http(s) URL of the page to capture"),
        "ai-analysis" => ("content", "text to analyse"),
        _ => ("markdown", "markdown source to render"),
    };
    json!({
        "type": "object",
        "required": [field],
        "properties": { field: { "type": "string", "description": description } },
    })
}

async fn chains(State(_state): State<AppState>) -> Json<Value> {
    let chains: Vec<Value> = NETWORKS
        .iter()
        .map(|n| {
            json!({
                "key": n.key,
                "caip2Id": n.caip2_id,
                "rpcUrl": n.rpc_url,
                "asset": n.asset_address,
                "gasless": n.gasless,
                "finality": n.finality,
            })
        })
        .collect();
    Json(json!({ "chains": chains }))
}

async fn compatibility(State(_state): State<AppState>) -> Json<Value> {
    Json(json!({
        "paymentStates": PaymentStatus::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "taskStates": TaskState::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "errorCodes": [
            CODE_INVALID_REQUEST,
            CODE_METHOD_NOT_FOUND,
            CODE_INVALID_PARAMS,
            CODE_TASK_NOT_FOUND,
        ],
        "stateTransitions": [
            { "from": "payment-required", "to": ["payment-submitted", "payment-rejected"] },
            { "from": "payment-submitted", "to": ["payment-verified"] },
            { "from": "payment-verified", "to": ["payment-completed", "payment-failed"] },
        ],
        "paymentRequirementFields": [
            "scheme", "network", "price", "payTo", "asset",
            "maxAmountRequired", "maxTimeoutSeconds",
        ],
        "eventKinds": [
            "payment-required", "payment-received", "payment-verified",
            "payment-settled", "payment-rejected", "siwx-access",
        ],
        "extensions": [EXT_X402_V01, EXT_X402_V02],
    }))
}

/// Live conformance sweep over the running stores.
async fn self_test(State(state): State<AppState>) -> Json<Value> {
    let mut results: Vec<Value> = Vec::new();
    let mut record = |test: &str, pass: bool, detail: String| {
        results.push(json!({ "test": test, "pass": pass, "detail": detail }));
    };

    // Completed priced tasks must carry a successful receipt.
    let tasks = state.tasks.all();
    let mut bad_receipts = 0usize;
    let mut checked = 0usize;
    for task in &tasks {
        let priced = task
            .metadata
            .skill
            .as_deref()
            .and_then(catalog::skill)
            .map(|s| s.requires_payment())
            .unwrap_or(false);
        if priced && task.status.state == TaskState::Completed {
            checked += 1;
            let ok = task
                .metadata
                .receipts
                .as_ref()
                .and_then(|r| r.first())
                .map(|r| r.success && r.transaction.as_deref().is_some_and(|t| !t.is_empty()))
                .unwrap_or(false);
            if !ok {
                bad_receipts += 1;
            }
        }
    }
    record(
        "completed-paid-tasks-have-success-receipts",
        bad_receipts == 0,
        format!("{checked} completed paid tasks checked, {bad_receipts} missing receipts"),
    );

    // Every payment-required event references a stored task.
    let (orphaned, required_total) = {
        let ledger = state.ledger.read().unwrap();
        let mut orphaned = 0usize;
        let mut total = 0usize;
        for event in ledger.events.iter() {
            if event.kind == EventKind::PaymentRequired {
                total += 1;
                if !state.tasks.contains(&event.task_id) {
                    orphaned += 1;
                }
            }
        }
        (orphaned, total)
    };
    record(
        "payment-required-events-reference-stored-tasks",
        orphaned == 0,
        format!("{required_total} events checked, {orphaned} orphaned"),
    );

    // Requirement objects carry every advertised field on every network.
    let reqs = requirements::build(
        catalog::skill("screenshot").expect("screenshot skill exists"),
        &state.config.payment.payee_address,
        &state.config.server.public_url,
    );
    let fields_ok = reqs
        .as_ref()
        .map(|r| {
            r.accepts.len() == NETWORKS.len()
                && r.accepts.iter().all(|a| {
                    a.scheme == "exact"
                        && !a.network.is_empty()
                        && !a.pay_to.is_empty()
                        && !a.asset.is_empty()
                        && !a.max_amount_required.is_empty()
                        && a.max_timeout_seconds > 0
                })
        })
        .unwrap_or(false);
    record(
        "payment-requirement-fields-present",
        fields_ok,
        format!("{} accepts entries validated", NETWORKS.len()),
    );

    record(
        "task-state-set-complete",
        TaskState::ALL.len() == 6,
        format!("{} task states declared", TaskState::ALL.len()),
    );
    record(
        "payment-state-set-complete",
        PaymentStatus::ALL.len() == 6,
        format!("{} payment states declared", PaymentStatus::ALL.len()),
    );

    let codes = [
        CODE_INVALID_REQUEST,
        CODE_METHOD_NOT_FOUND,
        CODE_INVALID_PARAMS,
        CODE_TASK_NOT_FOUND,
    ];
    record(
        "error-code-set-complete",
        codes.len() == 4,
        format!("{codes:?}"),
    );

    let all_passed = results
        .iter()
        .all(|r| r["pass"].as_bool().unwrap_or(false));
    Json(json!({ "allPassed": all_passed, "results": results }))
}
