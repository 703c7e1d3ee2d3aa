use serde::{Deserialize, Serialize};

/// Per-pool numeric view served by `/pool/{symbol}`. Every field is a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub tvl: String,
    pub volume: String,
    #[serde(rename = "totalApr")]
    pub total_apr: String,
    pub price: String,
    pub price_rev: String,
}
