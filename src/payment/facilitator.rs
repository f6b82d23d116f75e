//! Facilitator adapter.
//!
//! The gateway never verifies signatures itself. The default adapter accepts
//! any well-formed payload and synthesises a settlement id (test mode); the
//! remote adapter hands the payload to an out-of-process facilitator.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::types::{PaymentPayload, PaymentRequirements};

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorError {
    #[error("payment rejected: {0}")]
    Rejected(String),

    #[error("facilitator unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Facilitator: Send + Sync {
    /// Verify the payload against the requirements and settle. Returns the
    /// settlement transaction identifier.
    async fn verify_and_settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<String, FacilitatorError>;
}

/// In-process settlement: accepts any payload whose network is one of the
/// requirement's accepted networks and mints an opaque transaction id.
pub struct LocalFacilitator;

#[async_trait]
impl Facilitator for LocalFacilitator {
    async fn verify_and_settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<String, FacilitatorError> {
        if !requirements
            .accepts
            .iter()
            .any(|a| a.network == payload.network)
        {
            return Err(FacilitatorError::Rejected(format!(
                "network {} not accepted",
                payload.network
            )));
        }
        let bytes: [u8; 32] = rand::random();
        let tx = format!("0x{}", hex::encode(bytes));
        debug!(tx = %tx, network = %payload.network, "Synthesised settlement");
        Ok(tx)
    }
}

/// Remote facilitator client. The wire protocol is a single POST; anything
/// non-2xx counts as a rejection.
pub struct RemoteFacilitator {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SettleResponse {
    transaction: String,
}

impl RemoteFacilitator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Facilitator for RemoteFacilitator {
    async fn verify_and_settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<String, FacilitatorError> {
        let response = self
            .client
            .post(format!("{}/settle", self.base_url))
            .json(&json!({ "payload": payload, "requirements": requirements }))
            .send()
            .await
            .map_err(|e| FacilitatorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FacilitatorError::Rejected(format!(
                "facilitator returned {}",
                response.status()
            )));
        }
        let settled: SettleResponse = response
            .json()
            .await
            .map_err(|e| FacilitatorError::Transport(e.to_string()))?;
        Ok(settled.transaction)
    }
}
