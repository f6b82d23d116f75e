use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub ai: AiConfig,
    pub payment: PaymentConfig,
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Externally reachable base URL, used in the agent card and bazaar.
    pub public_url: String,
    /// Shared secret gating the detailed /stats view. None = open (dev mode).
    pub stats_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Rendering backend (screenshot + PDF). None disables those executors.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Absence degrades ai-analysis to a placeholder result, never an error.
    pub gemini_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Wallet receiving settlements on every enabled network.
    pub payee_address: String,
    /// Remote facilitator base URL. None = in-process test-mode settlement.
    pub facilitator_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    pub path: String,
    pub interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "4002".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                public_url: env::var("PUBLIC_URL")
                    .unwrap_or_else(|_| "http://localhost:4002".to_string()),
                stats_api_key: env::var("STATS_API_KEY").ok().filter(|k| !k.is_empty()),
            },
            backend: BackendConfig {
                api_url: env::var("BACKEND_API_URL").ok().filter(|u| !u.is_empty()),
                api_key: env::var("BACKEND_API_KEY").ok().filter(|k| !k.is_empty()),
            },
            ai: AiConfig {
                gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            },
            payment: PaymentConfig {
                payee_address: env::var("PAYEE_ADDRESS")
                    .unwrap_or_else(|_| "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string()),
                facilitator_url: env::var("FACILITATOR_URL").ok().filter(|u| !u.is_empty()),
            },
            snapshot: SnapshotConfig {
                path: env::var("SNAPSHOT_PATH").unwrap_or_else(|_| "gateway-state.json".to_string()),
                interval_secs: env::var("SNAPSHOT_INTERVAL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
            },
        })
    }

    /// Minimal config for unit tests: no backend, no AI key, local facilitator.
    #[cfg(test)]
    pub fn for_tests(snapshot_path: &str) -> Self {
        Self {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
                public_url: "http://localhost:4002".to_string(),
                stats_api_key: None,
            },
            backend: BackendConfig {
                api_url: None,
                api_key: None,
            },
            ai: AiConfig {
                gemini_api_key: None,
            },
            payment: PaymentConfig {
                payee_address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string(),
                facilitator_url: None,
            },
            snapshot: SnapshotConfig {
                path: snapshot_path.to_string(),
                interval_secs: 60,
            },
        }
    }
}
