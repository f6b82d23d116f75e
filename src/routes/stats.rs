//! Aggregated gateway statistics.
//!
//! The detailed view (event breakdown, revenue, recent activity) is gated
//! behind `STATS_API_KEY` when configured; other callers get the reduced
//! public summary.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::catalog;
use crate::models::AppState;
use crate::store::events::EventKind;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stats", get(stats))
        .with_state(state)
}

async fn stats(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    let (total_tasks, session_count, started_at) = {
        let ledger = state.ledger.read().unwrap();
        (
            ledger.total_tasks,
            ledger.sessions.len(),
            ledger.started_at,
        )
    };

    let public = json!({
        "service": "paygate",
        "totalTasks": total_tasks,
        "liveTasks": state.tasks.len(),
        "uptimeSeconds": uptime,
        "startedAt": started_at,
    });

    if !authorized(&state, &headers) {
        return Json(public);
    }

    let (event_total, by_kind, recent, revenue_by_skill) = {
        let ledger = state.ledger.read().unwrap();
        let mut revenue: std::collections::BTreeMap<String, u64> = Default::default();
        for event in ledger.events.iter() {
            if event.kind == EventKind::PaymentSettled {
                if let Some(skill) = catalog::skill(&event.skill) {
                    *revenue.entry(event.skill.clone()).or_insert(0) +=
                        skill.price_smallest_unit;
                }
            }
        }
        (
            ledger.events.len(),
            ledger.events.counts_by_kind(),
            ledger.events.tail(20).to_vec(),
            revenue,
        )
    };
    let revenue_total: u64 = revenue_by_skill.values().sum();

    let mut detailed = public;
    let obj = detailed.as_object_mut().expect("stats summary is an object");
    obj.insert("states".to_string(), json!(state.tasks.state_counts()));
    obj.insert(
        "events".to_string(),
        json!({ "total": event_total, "byKind": by_kind, "recent": recent }),
    );
    obj.insert("sessions".to_string(), json!(session_count));
    obj.insert(
        "revenue".to_string(),
        json!({
            "totalSmallestUnit": revenue_total,
            "display": catalog::price_display(revenue_total),
            "bySkill": revenue_by_skill,
        }),
    );
    Json(detailed)
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.config.server.stats_api_key.as_deref() else {
        // No key configured: the deployment is open (dev mode).
        return true;
    };
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    bearer == Some(expected) || api_key == Some(expected)
}
