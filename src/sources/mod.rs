pub mod remote;

use async_trait::async_trait;
use thiserror::Error;

pub use remote::RemoteSnapshotSource;

/// Where snapshot archives come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    fn name(&self) -> &str;
    async fn list_snapshots(&self) -> Result<Vec<String>, FetchError>;
    async fn fetch_snapshot(&self, id: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed listing: {0}")]
    MalformedListing(#[source] serde_json::Error),
    #[error("listing is empty")]
    EmptyListing,
}

/// Picks the lexicographically greatest identifier. Arrival order is ignored,
/// so `s10` sorts before `s2`.
pub fn select_latest(listing: &[String]) -> Option<&str> {
    let mut sorted: Vec<&str> = listing.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.last().copied()
}
