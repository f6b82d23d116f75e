//! Payment-requirements builder.
//!
//! Requirements are a pure function of skill × network catalogue, so two
//! calls for the same skill always produce identical objects (modulo nothing:
//! there is no randomness here).

use serde_json::json;

use crate::catalog::{self, Skill, NETWORKS};
use crate::types::{AcceptsEntry, PaymentRequirements};

/// Payment-extension URI the gateway implements (current).
pub const EXT_X402_V02: &str = "https://github.com/google-agentic-commerce/a2a-x402/v0.2";
/// Previous extension revision, still accepted from older clients.
pub const EXT_X402_V01: &str = "https://github.com/google-agentic-commerce/a2a-x402/v0.1";
/// Payment-configuration extension carrying the network catalogue.
pub const EXT_PAYMENT_CONFIG: &str = "urn:x402:payment-config";

pub const SCHEME_EXACT: &str = "exact";
pub const MAX_TIMEOUT_SECONDS: u64 = 600;

/// Build the requirements for a priced skill; `None` for free skills (the
/// caller takes the free-execution path).
pub fn build(skill: &Skill, payee: &str, public_url: &str) -> Option<PaymentRequirements> {
    if !skill.requires_payment() {
        return None;
    }

    let accepts = accepts_for(skill, payee);
    Some(PaymentRequirements {
        version: "2.0".to_string(),
        accepts,
        resource: format!("/{}", skill.id),
        description: skill.description.to_string(),
        facilitator: format!("{public_url}/facilitator"),
        extensions: extensions_descriptor(),
    })
}

/// One `accepts` entry per enabled network, in catalogue order.
pub fn accepts_for(skill: &Skill, payee: &str) -> Vec<AcceptsEntry> {
    NETWORKS
        .iter()
        .map(|n| AcceptsEntry {
            scheme: SCHEME_EXACT.to_string(),
            network: n.caip2_id.to_string(),
            price: catalog::price_display(skill.price_smallest_unit),
            pay_to: payee.to_string(),
            asset: n.asset_address.to_string(),
            max_amount_required: skill.price_smallest_unit.to_string(),
            max_timeout_seconds: MAX_TIMEOUT_SECONDS,
            gasless: n.gasless.then_some(true),
        })
        .collect()
}

/// Fixed capability descriptor advertised alongside every requirements object.
pub fn extensions_descriptor() -> serde_json::Value {
    json!({
        "session-auth": { "supported": true, "scheme": "siwx" },
        "idempotent-payment": { "supported": true },
    })
}
