//! Static skill and network catalogues.
//!
//! Prices are integers in the stablecoin's smallest unit (6 decimals), so
//! 10000 units = $0.01.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "priceSmallestUnit")]
    pub price_smallest_unit: u64,
    #[serde(rename = "inputModes")]
    pub input_modes: &'static [&'static str],
    #[serde(rename = "outputModes")]
    pub output_modes: &'static [&'static str],
}

impl Skill {
    pub fn requires_payment(&self) -> bool {
        self.price_smallest_unit > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Network {
    pub key: &'static str,
    #[serde(rename = "caip2Id")]
    pub caip2_id: &'static str,
    #[serde(rename = "assetAddress")]
    pub asset_address: &'static str,
    pub gasless: bool,
    #[serde(rename = "rpcUrl")]
    pub rpc_url: &'static str,
    pub finality: &'static str,
}

pub const SKILLS: &[Skill] = &[
    Skill {
        id: "screenshot",
        name: "Web Screenshot",
        description: "Capture a full-page screenshot of any public URL",
        price_smallest_unit: 10_000,
        input_modes: &["text/plain"],
        output_modes: &["image/png"],
    },
    Skill {
        id: "markdown-to-pdf",
        name: "Markdown to PDF",
        description: "Render markdown into a typeset PDF document",
        price_smallest_unit: 5_000,
        input_modes: &["text/plain", "text/markdown"],
        output_modes: &["application/pdf"],
    },
    Skill {
        id: "markdown-to-html",
        name: "Markdown to HTML",
        description: "Render markdown into a standalone HTML page",
        price_smallest_unit: 0,
        input_modes: &["text/plain", "text/markdown"],
        output_modes: &["text/html"],
    },
    Skill {
        id: "ai-analysis",
        name: "AI Text Analysis",
        description: "Summarise or analyse text with an AI model",
        price_smallest_unit: 20_000,
        input_modes: &["text/plain"],
        output_modes: &["application/json"],
    },
];

pub const NETWORKS: &[Network] = &[
    Network {
        key: "base",
        caip2_id: "eip155:8453",
        asset_address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
        gasless: false,
        rpc_url: "https://mainnet.base.org",
        finality: "~2s",
    },
    Network {
        key: "avalanche",
        caip2_id: "eip155:43114",
        asset_address: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
        gasless: false,
        rpc_url: "https://api.avax.network/ext/bc/C/rpc",
        finality: "~1s",
    },
    Network {
        key: "skale-europa",
        caip2_id: "eip155:2046399126",
        asset_address: "0x5F795bb52dAC3085f578f4877D450e2929D2F13d",
        gasless: true,
        rpc_url: "https://mainnet.skalenodes.com/v1/elated-tan-skat",
        finality: "~3s",
    },
];

pub fn skill(id: &str) -> Option<&'static Skill> {
    SKILLS.iter().find(|s| s.id == id)
}

pub fn network_by_caip2(caip2: &str) -> Option<&'static Network> {
    NETWORKS.iter().find(|n| n.caip2_id == caip2)
}

/// Dollar display string for a smallest-unit amount, e.g. 10000 → "$0.01".
pub fn price_display(units: u64) -> String {
    let whole = units / 1_000_000;
    let frac = units % 1_000_000;
    if frac == 0 {
        return format!("${whole}");
    }
    let frac = format!("{frac:06}");
    format!("${whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_has_four_skills_and_one_free() {
        assert_eq!(SKILLS.len(), 4);
        let free: Vec<_> = SKILLS.iter().filter(|s| !s.requires_payment()).collect();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].id, "markdown-to-html");
    }

    #[test]
    fn exactly_one_gasless_network() {
        assert_eq!(NETWORKS.len(), 3);
        assert_eq!(NETWORKS.iter().filter(|n| n.gasless).count(), 1);
        for n in NETWORKS {
            assert!(n.caip2_id.starts_with("eip155:"));
        }
    }

    #[test]
    fn price_display_trims_trailing_zeros() {
        assert_eq!(price_display(10_000), "$0.01");
        assert_eq!(price_display(5_000), "$0.005");
        assert_eq!(price_display(20_000), "$0.02");
        assert_eq!(price_display(1_000_000), "$1");
    }

    #[test]
    fn lookup_by_id_and_caip2() {
        assert!(skill("screenshot").is_some());
        assert!(skill("nope").is_none());
        assert_eq!(network_by_caip2("eip155:8453").unwrap().key, "base");
    }
}
