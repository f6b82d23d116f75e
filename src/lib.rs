// Paygate - pay-per-request agent gateway (A2A JSON-RPC + HTTP 402)

pub mod catalog;
pub mod config;
pub mod executor;
pub mod models;
pub mod parser;
pub mod payment;
pub mod requirements;
pub mod routes;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
