//! REST x402 dispatcher.
//!
//! Every priced skill answers GET with 402 + payment requirements, and POST
//! with either the same 402 (no payment header) or verify-then-execute. The
//! free markdown-to-html skill is POST-only and returns the rendered body
//! directly.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tracing::info;

use crate::catalog::{self, Skill};
use crate::models::AppState;
use crate::parser::SkillRequest;
use crate::payment::state_machine;
use crate::requirements;
use crate::types::{new_id, Message, Part, PaymentPayload, Role, TaskState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/x402/{skill}", get(get_requirements).post(post_skill))
        .with_state(state)
}

/// GET always answers 402 with the requirements for a priced skill.
async fn get_requirements(
    State(state): State<AppState>,
    Path(skill_id): Path<String>,
) -> Response {
    let Some(skill) = catalog::skill(&skill_id) else {
        return error_response(StatusCode::NOT_FOUND, "unknown skill");
    };
    match requirements::build(
        skill,
        &state.config.payment.payee_address,
        &state.config.server.public_url,
    ) {
        Some(reqs) => (StatusCode::PAYMENT_REQUIRED, Json(reqs)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "skill is free; POST directly"),
    }
}

async fn post_skill(
    State(state): State<AppState>,
    Path(skill_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(skill) = catalog::skill(&skill_id) else {
        return error_response(StatusCode::NOT_FOUND, "unknown skill");
    };

    if !skill.requires_payment() {
        let request = match parse_body(skill, &body) {
            Ok(r) => r,
            Err(reason) => return error_response(StatusCode::BAD_REQUEST, &reason),
        };
        return run_free(&state, request).await;
    }

    // The payment header gates everything else: without one the response is
    // the same 402 the GET serves, whatever the body looks like.
    let payload = match payment_from_headers(&headers) {
        Ok(p) => p,
        Err(reason) => return error_response(StatusCode::BAD_REQUEST, &reason),
    };
    let Some(payload) = payload else {
        let reqs = requirements::build(
            skill,
            &state.config.payment.payee_address,
            &state.config.server.public_url,
        )
        .expect("priced skill always has requirements");
        return (StatusCode::PAYMENT_REQUIRED, Json(reqs)).into_response();
    };

    let request = match parse_body(skill, &body) {
        Ok(r) => r,
        Err(reason) => return error_response(StatusCode::BAD_REQUEST, &reason),
    };
    run_paid(&state, skill, request, payload, &body).await
}

/// Extract the parsed skill arguments from the REST body.
fn parse_body(skill: &Skill, body: &str) -> Result<SkillRequest, String> {
    let value: Value =
        serde_json::from_str(body).map_err(|_| "body must be a JSON object".to_string())?;
    let field = |name: &str| -> Result<String, String> {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("{name} is required"))
    };
    match skill.id {
        "screenshot" => Ok(SkillRequest::Screenshot { url: field("url")? }),
        "markdown-to-pdf" => Ok(SkillRequest::MarkdownToPdf {
            markdown: field("markdown")?,
        }),
        "markdown-to-html" => Ok(SkillRequest::MarkdownToHtml {
            markdown: field("markdown")?,
        }),
        "ai-analysis" => Ok(SkillRequest::AiAnalysis {
            content: field("content")?,
        }),
        other => Err(format!("unknown skill {other}")),
    }
}

/// Payment payload from `Payment-Signature` or `X-Payment`; both raw JSON and
/// base64-encoded JSON values are accepted.
fn payment_from_headers(headers: &HeaderMap) -> Result<Option<PaymentPayload>, String> {
    let raw = headers
        .get("payment-signature")
        .or_else(|| headers.get("x-payment"));
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw
        .to_str()
        .map_err(|_| "payment header is not valid text".to_string())?;

    let decoded = match serde_json::from_str::<PaymentPayload>(raw) {
        Ok(p) => p,
        Err(_) => {
            let bytes = BASE64
                .decode(raw)
                .map_err(|_| "payment header is neither JSON nor base64".to_string())?;
            serde_json::from_slice(&bytes)
                .map_err(|_| "payment header does not decode to a payment payload".to_string())?
        }
    };
    Ok(Some(decoded))
}

async fn run_free(state: &AppState, request: SkillRequest) -> Response {
    match state.executors.run(&request).await {
        Ok(output) => {
            let media = output.media_type.clone();
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, media)
                .body(Body::from(output.into_bytes()))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn run_paid(
    state: &AppState,
    skill: &Skill,
    request: SkillRequest,
    payload: PaymentPayload,
    raw_body: &str,
) -> Response {
    // REST calls flow through the same task machinery as JSON-RPC, so every
    // payment event carries a task id and /stats sees both surfaces.
    let message = Message {
        message_id: new_id(),
        role: Role::User,
        kind: "message".to_string(),
        parts: vec![Part::Text {
            text: raw_body.to_string(),
        }],
        task_id: None,
        context_id: None,
        metadata: None,
    };
    let task = state_machine::create_task(state, &message, &request, skill);
    info!(task_id = %task.id, skill = skill.id, "REST paid request");

    let run = match state_machine::execute_paid(state, task, payload, None).await {
        Ok(run) => run,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match run.delivery {
        Some((output, tx)) => {
            let media = output.media_type.clone();
            let payment_response = json!({ "settled": true, "txHash": tx }).to_string();
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, media)
                .header("X-Payment-Response", payment_response)
                .body(Body::from(output.into_bytes()))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        None => {
            // Payment went through the machinery but execution (or
            // settlement) failed: surface it as a server error.
            let reason = run
                .task
                .metadata
                .receipts
                .as_ref()
                .and_then(|r| r.first())
                .and_then(|r| r.error_reason.clone())
                .unwrap_or_else(|| "execution failed".to_string());
            let status = if run.task.status.state == TaskState::Failed {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::CONFLICT
            };
            error_response(status, &reason)
        }
    }
}

fn error_response(status: StatusCode, reason: &str) -> Response {
    (status, Json(json!({ "error": reason }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::catalog::NETWORKS;

    async fn call(
        state: AppState,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> (StatusCode, HeaderMap, Vec<u8>) {
        let app = router(state);
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let response = app
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes.to_vec())
    }

    fn payment_header() -> String {
        json!({
            "network": "eip155:8453",
            "scheme": "exact",
            "signature": "0xFF",
            "from": "0xABC"
        })
        .to_string()
    }

    #[tokio::test]
    async fn get_priced_skill_returns_402_with_all_networks() {
        let state = AppState::for_tests();
        let (status, _, body) = call(state, "GET", "/x402/screenshot", &[], "").await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["accepts"].as_array().unwrap().len(), NETWORKS.len());
        assert_eq!(value["version"], "2.0");
    }

    #[tokio::test]
    async fn get_unknown_skill_is_404() {
        let state = AppState::for_tests();
        let (status, _, _) = call(state, "GET", "/x402/nope", &[], "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn post_without_payment_is_402() {
        let state = AppState::for_tests();
        let (status, _, body) = call(
            state,
            "POST",
            "/x402/ai-analysis",
            &[],
            &json!({ "content": "numbers" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value["accepts"].is_array());
    }

    #[tokio::test]
    async fn post_missing_field_is_400() {
        let state = AppState::for_tests();
        let header = payment_header();
        let (status, _, body) = call(
            state,
            "POST",
            "/x402/screenshot",
            &[("X-Payment", header.as_str())],
            &json!({ "address": "https://example.com" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "url is required");
    }

    #[tokio::test]
    async fn missing_payment_header_wins_over_missing_body_field() {
        // No payment header and a bad body: the 402 comes first.
        let state = AppState::for_tests();
        let (status, _, body) = call(
            state,
            "POST",
            "/x402/screenshot",
            &[],
            &json!({ "address": "https://example.com" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value["accepts"].is_array());
    }

    #[tokio::test]
    async fn free_skill_missing_field_is_still_400() {
        let state = AppState::for_tests();
        let (status, _, _) = call(
            state,
            "POST",
            "/x402/markdown-to-html",
            &[],
            &json!({ "text": "# Hello" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn free_skill_post_returns_rendered_html() {
        let state = AppState::for_tests();
        let (status, headers, body) = call(
            state,
            "POST",
            "/x402/markdown-to-html",
            &[],
            &json!({ "markdown": "# Hello" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(String::from_utf8(body).unwrap().contains("<h1>Hello</h1>"));
    }

    #[tokio::test]
    async fn paid_post_with_json_payment_header_settles() {
        let state = AppState::for_tests();
        let header = payment_header();
        let (status, headers, body) = call(
            state.clone(),
            "POST",
            "/x402/ai-analysis",
            &[("X-Payment", header.as_str())],
            &json!({ "content": "numbers" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let payment_response: Value = serde_json::from_str(
            headers.get("x-payment-response").unwrap().to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(payment_response["settled"], true);
        assert!(payment_response["txHash"].as_str().unwrap().starts_with("0x"));
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value["analysis"].is_string());

        let ledger = state.ledger.read().unwrap();
        assert!(ledger.sessions.has("0xabc", "ai-analysis"));
    }

    #[tokio::test]
    async fn paid_post_with_base64_payment_header_settles() {
        let state = AppState::for_tests();
        let header = BASE64.encode(payment_header());
        let (status, _, _) = call(
            state,
            "POST",
            "/x402/ai-analysis",
            &[("Payment-Signature", header.as_str())],
            &json!({ "content": "numbers" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn paid_executor_failure_after_payment_is_500() {
        let state = AppState::for_tests();
        let header = payment_header();
        // No screenshot backend configured in tests.
        let (status, _, body) = call(
            state,
            "POST",
            "/x402/screenshot",
            &[("X-Payment", header.as_str())],
            &json!({ "url": "https://example.com" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value["error"].is_string());
    }

    #[tokio::test]
    async fn garbled_payment_header_is_400() {
        let state = AppState::for_tests();
        let (status, _, _) = call(
            state,
            "POST",
            "/x402/ai-analysis",
            &[("X-Payment", "!!not-base64!!")],
            &json!({ "content": "numbers" }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
