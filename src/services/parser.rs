use thiserror::Error;
use crate::models::PoolStatsSnapshot;

#[derive(Debug, Error)]
#[error("snapshot schema mismatch: {0}")]
pub struct ParseError(#[from] serde_json::Error);

/// Strict decode of a `data.json` payload. Any structural mismatch rejects
/// the whole snapshot.
pub fn parse_snapshot(payload: &[u8]) -> Result<PoolStatsSnapshot, ParseError> {
    Ok(serde_json::from_slice(payload)?)
}
