use serde::{Deserialize, Serialize};

/// Fully parsed `data.json` payload of one snapshot archive.
///
/// Nested objects are required; scalar fields default to an empty string so a
/// record with a missing number still renders (as `0`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatsSnapshot {
    pub data: PoolStatsData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatsData {
    #[serde(rename = "lpList")]
    pub lp_list: Vec<PoolRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRecord {
    #[serde(default)]
    pub symbol: String,
    pub coin_a: CoinInfo,
    pub coin_b: CoinInfo,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub pure_tvl_in_usd: String,
    #[serde(default, rename = "volInUsd24H")]
    pub vol_in_usd_24h: String,
    #[serde(default)]
    pub total_apr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinInfo {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub logo_url: String,
}

impl PoolStatsSnapshot {
    pub fn pools(&self) -> &[PoolRecord] {
        &self.data.lp_list
    }

    /// First record with this symbol, in snapshot order. Duplicates are kept.
    pub fn find(&self, symbol: &str) -> Option<&PoolRecord> {
        self.pools().iter().find(|pool| pool.symbol == symbol)
    }
}
