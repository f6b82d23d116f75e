//! HTTP surface.
//!
//! Two wire surfaces share one router: the A2A JSON-RPC dispatcher at `/` and
//! `/a2a`, and the REST x402 endpoints under `/x402/…`, plus discovery,
//! stats, and health endpoints.

pub mod discovery;
pub mod health;
pub mod rpc;
pub mod stats;
pub mod x402;

use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(rpc::router(state.clone()))
        .merge(x402::router(state.clone()))
        .merge(discovery::router(state.clone()))
        .merge(stats::router(state.clone()))
        .merge(health::router(state))
        .layer(cors_layer())
        .layer(middleware::from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
}

/// CORS preflight replies are 204 No Content. This sits outside the CORS
/// layer, which answers preflight with 200 and offers no status override.
async fn preflight_no_content(req: Request, next: Next) -> Response {
    let is_options = req.method() == Method::OPTIONS;
    let mut response = next.run(req).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

/// Permissive CORS with the payment headers explicitly allowed and exposed so
/// browser agents can read the settlement response.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-payment"),
            HeaderName::from_static("x-payment-response"),
            HeaderName::from_static("payment-signature"),
            HeaderName::from_static("payment-required"),
            HeaderName::from_static("x-a2a-extensions"),
        ])
        .expose_headers([
            HeaderName::from_static("x-payment-response"),
            HeaderName::from_static("payment-response"),
            HeaderName::from_static("payment-required"),
            HeaderName::from_static("x-a2a-extensions"),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    #[tokio::test]
    async fn cors_preflight_is_204() {
        let app = create_router(AppState::for_tests());
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/x402/screenshot")
                    .header("origin", "https://agent.example")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "x-payment")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_some());
    }

    #[tokio::test]
    async fn preflight_rewrite_leaves_regular_responses_alone() {
        let app = create_router(AppState::for_tests());
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .header("origin", "https://agent.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
