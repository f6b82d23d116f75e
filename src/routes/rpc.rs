//! JSON-RPC 2.0 dispatcher (A2A surface).
//!
//! Accepts the envelope at `/` and `/a2a`. Methods: `message/send` (alias
//! `tasks/send`), `tasks/get`, `tasks/cancel`. The extension-activation
//! handshake echoes the negotiated x402 extension URI back in the
//! `X-A2A-Extensions` response header.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::models::AppState;
use crate::payment::state_machine;
use crate::requirements::{EXT_X402_V01, EXT_X402_V02};
use crate::types::{AppError, Message, PaymentMeta, TaskState};

pub const CODE_INVALID_REQUEST: i64 = -32600;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INVALID_PARAMS: i64 = -32602;
pub const CODE_INTERNAL: i64 = -32603;
pub const CODE_TASK_NOT_FOUND: i64 = -32001;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/a2a", post(handle_rpc))
        .with_state(state)
}

async fn handle_rpc(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let mut response_headers = HeaderMap::new();
    if let Some(uri) = extension_echo(&headers) {
        response_headers.insert("X-A2A-Extensions", HeaderValue::from_static(uri));
    }

    let envelope: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => {
            let err = error_envelope(Value::Null, CODE_INVALID_REQUEST, "invalid JSON");
            return (response_headers, Json(err));
        }
    };
    let id = envelope.get("id").cloned().unwrap_or(Value::Null);

    if envelope.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        let err = error_envelope(id, CODE_INVALID_REQUEST, "jsonrpc must be \"2.0\"");
        return (response_headers, Json(err));
    }

    let method = envelope
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = envelope.get("params").cloned().unwrap_or(Value::Null);
    debug!(method = %method, "JSON-RPC request");

    let result = match method.as_str() {
        "message/send" | "tasks/send" => message_send(&state, params).await,
        "tasks/get" => tasks_get(&state, &params),
        "tasks/cancel" => tasks_cancel(&state, &params),
        _ => Err((CODE_METHOD_NOT_FOUND, format!("unknown method {method}"))),
    };

    let envelope = match result {
        Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
        Err((code, message)) => error_envelope(id, code, &message),
    };
    (response_headers, Json(envelope))
}

async fn message_send(state: &AppState, params: Value) -> Result<Value, (i64, String)> {
    let message_value = params
        .get("message")
        .cloned()
        .ok_or((CODE_INVALID_PARAMS, "params.message is required".to_string()))?;
    let message: Message = serde_json::from_value(message_value)
        .map_err(|e| (CODE_INVALID_PARAMS, format!("invalid message: {e}")))?;
    if message.text().is_none() {
        return Err((
            CODE_INVALID_PARAMS,
            "message.parts must contain a text part".to_string(),
        ));
    }
    let request_meta: Option<PaymentMeta> = params
        .get("metadata")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());

    let task = state_machine::handle(state, message, request_meta)
        .await
        .map_err(rpc_error)?;
    serde_json::to_value(task).map_err(|e| (CODE_INTERNAL, e.to_string()))
}

fn tasks_get(state: &AppState, params: &Value) -> Result<Value, (i64, String)> {
    let id = param_id(params)?;
    let task = state
        .tasks
        .get(id)
        .ok_or((CODE_TASK_NOT_FOUND, format!("task {id} not found")))?;
    serde_json::to_value(task).map_err(|e| (CODE_INTERNAL, e.to_string()))
}

fn tasks_cancel(state: &AppState, params: &Value) -> Result<Value, (i64, String)> {
    let id = param_id(params)?;
    let task = state
        .tasks
        .transition(id, TaskState::Canceled, None, |_| {})
        .ok_or((CODE_TASK_NOT_FOUND, format!("task {id} not found")))?;
    serde_json::to_value(task).map_err(|e| (CODE_INTERNAL, e.to_string()))
}

fn param_id(params: &Value) -> Result<&str, (i64, String)> {
    params
        .get("id")
        .and_then(Value::as_str)
        .ok_or((CODE_INVALID_PARAMS, "params.id is required".to_string()))
}

fn rpc_error(err: AppError) -> (i64, String) {
    let code = match &err {
        AppError::TaskNotFound(_) => CODE_TASK_NOT_FOUND,
        AppError::InvalidRequest(_) => CODE_INVALID_PARAMS,
        AppError::Executor(_) | AppError::Internal(_) => CODE_INTERNAL,
    };
    (code, err.to_string())
}

fn error_envelope(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// Pick the extension URI to echo. v0.1 only when the client named it
/// explicitly; any other x402 mention negotiates the current revision.
fn extension_echo(headers: &HeaderMap) -> Option<&'static str> {
    let value = headers.get("x-a2a-extensions")?.to_str().ok()?;
    if value.contains("a2a-x402/v0.1") {
        Some(EXT_X402_V01)
    } else if value.contains("a2a-x402") {
        Some(EXT_X402_V02)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn call(state: AppState, headers: &[(&str, &str)], body: Value) -> (StatusCode, HeaderMap, Value) {
        let app = router(state);
        let mut builder = Request::builder()
            .method("POST")
            .uri("/")
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
        let value = serde_json::from_slice(&bytes).unwrap();
        (status, headers, value)
    }

    fn send_envelope(text: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "message/send",
            "params": {
                "message": {
                    "messageId": "m1",
                    "role": "user",
                    "kind": "message",
                    "parts": [{ "kind": "text", "text": text }],
                }
            }
        })
    }

    #[tokio::test]
    async fn free_skill_completes_over_http() {
        let state = AppState::for_tests();
        let (status, _, body) = call(state, &[], send_envelope("# Hello")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["status"]["state"], "completed");
        let html = body["result"]["status"]["message"]["parts"][0]["data"]["html"]
            .as_str()
            .unwrap();
        assert!(html.contains("Hello"));
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_rejected() {
        let state = AppState::for_tests();
        let (_, _, body) = call(
            state,
            &[],
            json!({ "jsonrpc": "1.0", "id": 1, "method": "message/send", "params": {} }),
        )
        .await;
        assert_eq!(body["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn unknown_method_is_32601() {
        let state = AppState::for_tests();
        let (_, _, body) = call(
            state,
            &[],
            json!({ "jsonrpc": "2.0", "id": 1, "method": "message/stream", "params": {} }),
        )
        .await;
        assert_eq!(body["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn message_without_text_part_is_32602() {
        let state = AppState::for_tests();
        let (_, _, body) = call(
            state,
            &[],
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "message/send",
                "params": { "message": { "role": "user", "parts": [] } }
            }),
        )
        .await;
        assert_eq!(body["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn tasks_get_returns_the_created_task_verbatim() {
        let state = AppState::for_tests();
        let (_, _, created) = call(state.clone(), &[], send_envelope("# Hi")).await;
        let task_id = created["result"]["id"].as_str().unwrap();

        let (_, _, fetched) = call(
            state,
            &[],
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tasks/get", "params": { "id": task_id } }),
        )
        .await;
        assert_eq!(fetched["result"], created["result"]);
    }

    #[tokio::test]
    async fn tasks_get_unknown_id_is_32001() {
        let state = AppState::for_tests();
        let (_, _, body) = call(
            state,
            &[],
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tasks/get", "params": { "id": "nope" } }),
        )
        .await;
        assert_eq!(body["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn tasks_cancel_forces_canceled() {
        let state = AppState::for_tests();
        // Screenshot is priced, so the task parks in input-required.
        let (_, _, created) = call(
            state.clone(),
            &[],
            send_envelope("screenshot https://example.com"),
        )
        .await;
        assert_eq!(created["result"]["status"]["state"], "input-required");
        let task_id = created["result"]["id"].as_str().unwrap();

        let (_, _, canceled) = call(
            state,
            &[],
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tasks/cancel", "params": { "id": task_id } }),
        )
        .await;
        assert_eq!(canceled["result"]["status"]["state"], "canceled");
    }

    #[tokio::test]
    async fn extension_header_echoes_v02_by_default() {
        let state = AppState::for_tests();
        let (_, headers, _) = call(
            state,
            &[("x-a2a-extensions", EXT_X402_V02)],
            send_envelope("# Hi"),
        )
        .await;
        assert_eq!(
            headers.get("x-a2a-extensions").unwrap().to_str().unwrap(),
            EXT_X402_V02
        );
    }

    #[tokio::test]
    async fn extension_header_echoes_v01_when_named() {
        let state = AppState::for_tests();
        let (_, headers, _) = call(
            state,
            &[("x-a2a-extensions", EXT_X402_V01)],
            send_envelope("# Hi"),
        )
        .await;
        assert_eq!(
            headers.get("x-a2a-extensions").unwrap().to_str().unwrap(),
            EXT_X402_V01
        );
    }

    #[tokio::test]
    async fn standalone_flow_over_http() {
        let state = AppState::for_tests();
        let (_, _, first) = call(
            state.clone(),
            &[],
            send_envelope("summarize: the numbers"),
        )
        .await;
        assert_eq!(first["result"]["status"]["state"], "input-required");
        let task_id = first["result"]["id"].as_str().unwrap();
        let accepts = &first["result"]["status"]["message"]["metadata"]["x402PaymentRequired"]["accepts"];
        assert!(accepts.as_array().unwrap().len() >= 2);

        let (_, _, second) = call(
            state,
            &[],
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "message/send",
                "params": { "message": {
                    "messageId": "m2",
                    "role": "user",
                    "kind": "message",
                    "parts": [{ "kind": "text", "text": "paying now" }],
                    "taskId": task_id,
                    "metadata": {
                        "x402.payment.status": "payment-submitted",
                        "x402.payment.payload": {
                            "network": "eip155:8453",
                            "scheme": "exact",
                            "signature": "0xFF",
                            "from": "0xABC"
                        }
                    }
                } }
            }),
        )
        .await;
        assert_eq!(second["result"]["id"], task_id);
        assert_eq!(second["result"]["status"]["state"], "completed");
        assert_eq!(second["result"]["metadata"]["paymentStatus"], "payment-completed");
    }
}
