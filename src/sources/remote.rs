use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use super::{FetchError, SnapshotSource};

/// HTTP snapshot server: `GET {base}/` lists ids, `GET {base}/{id}` returns
/// the archive bytes. No retries; the next refresh tick is the retry.
pub struct RemoteSnapshotSource {
    client: Client,
    base_url: String,
}

impl RemoteSnapshotSource {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        Ok(resp)
    }
}

#[async_trait]
impl SnapshotSource for RemoteSnapshotSource {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn list_snapshots(&self) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/", self.base_url);
        let body = self.get(&url).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(FetchError::MalformedListing)
    }

    async fn fetch_snapshot(&self, id: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/{}", self.base_url, id);
        let body = self.get(&url).await?.bytes().await?;
        tracing::debug!("fetched snapshot {} ({} bytes)", id, body.len());
        Ok(body.to_vec())
    }
}
