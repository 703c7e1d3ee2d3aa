use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::sources::{select_latest, FetchError, SnapshotSource};
use super::archive::{extract_entry, ExtractError};
use super::parser::{parse_snapshot, ParseError};
use super::render::render;
use super::PublishedCache;

/// Key under which the full parsed snapshot is published as JSON.
pub const LAST_DATA_KEY: &str = "lastData";

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("extract failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("archive has no entry named {name}")]
    MissingEntry { name: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("refresh cancelled")]
    Cancelled,
}

/// Outcome of one successful pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub snapshot_id: String,
    pub pools: usize,
    pub artifacts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastPublish {
    pub snapshot_id: String,
    pub pools: usize,
    pub published_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RefreshStats {
    pub passes: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub consecutive_failures: AtomicU64,
    last_publish: RwLock<Option<LastPublish>>,
}

impl RefreshStats {
    pub fn last_publish(&self) -> Option<LastPublish> {
        self.last_publish.read().clone()
    }

    fn record_success(&self, report: &PassReport) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_publish.write() = Some(LastPublish {
            snapshot_id: report.snapshot_id.clone(),
            pools: report.pools,
            published_at: Utc::now(),
        });
    }

    fn record_failure(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs the fetch → extract → parse → render → publish pipeline on a fixed
/// cadence. Passes never overlap and a failed pass leaves the cache untouched.
pub struct RefreshLoop {
    source: Arc<dyn SnapshotSource>,
    cache: Arc<PublishedCache>,
    stats: Arc<RefreshStats>,
    entry_name: String,
    period: Duration,
    cancel: CancellationToken,
}

impl RefreshLoop {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        cache: Arc<PublishedCache>,
        stats: Arc<RefreshStats>,
        entry_name: &str,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            cache,
            stats,
            entry_name: entry_name.to_string(),
            period,
            cancel,
        }
    }

    fn checkpoint(&self) -> Result<(), RefreshError> {
        if self.cancel.is_cancelled() {
            return Err(RefreshError::Cancelled);
        }
        Ok(())
    }

    /// Network waits end as soon as the loop is cancelled.
    async fn cancellable<T, F>(&self, fut: F) -> Result<T, RefreshError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(RefreshError::Cancelled),
            result = fut => Ok(result?),
        }
    }

    pub async fn run_pass(&self) -> Result<PassReport, RefreshError> {
        let listing = self.cancellable(self.source.list_snapshots()).await?;
        let snapshot_id = select_latest(&listing)
            .ok_or(FetchError::EmptyListing)?
            .to_string();
        self.checkpoint()?;

        let archive = self.cancellable(self.source.fetch_snapshot(&snapshot_id)).await?;

        let payload = extract_entry(&archive, &self.entry_name)?.ok_or_else(|| {
            RefreshError::MissingEntry {
                name: self.entry_name.clone(),
            }
        })?;
        drop(archive);

        let snapshot = parse_snapshot(&payload)?;
        let blob = serde_json::to_string(&snapshot).map_err(RefreshError::Encode)?;

        let mut artifacts = render(&snapshot);
        artifacts.insert(LAST_DATA_KEY.to_string(), blob);
        self.checkpoint()?;

        let report = PassReport {
            snapshot_id,
            pools: snapshot.pools().len(),
            artifacts: artifacts.len(),
        };
        self.cache.replace_all(artifacts);
        Ok(report)
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("🔄 Refresh loop started ({} every {:?})", self.source.name(), self.period);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_pass().await {
                Ok(report) => {
                    self.stats.record_success(&report);
                    tracing::info!(
                        "✓ Published {} ({} pools, {} artifacts)",
                        report.snapshot_id,
                        report.pools,
                        report.artifacts
                    );
                }
                Err(RefreshError::Cancelled) => break,
                Err(e) => {
                    self.stats.record_failure();
                    tracing::warn!("Refresh pass aborted: {}", e);
                }
            }
        }

        tracing::info!("Refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PoolSummary;
    use crate::services::archive::tests::zip_with;
    use crate::services::render::{pool_key, ITEMS_KEY};
    use async_trait::async_trait;

    const ONE_POOL: &str = r#"{"data":{"lpList":[{
        "symbol":"A-B",
        "coinA":{"symbol":"A","logoUrl":"a.png"},
        "coinB":{"symbol":"B","logoUrl":"b.png"},
        "price":"2.5","pureTvlInUsd":"1000","volInUsd24H":"500","totalApr":"0.1"
    }]}}"#;

    enum Step {
        Ok,
        ListFails,
        EmptyListing,
        FetchFails,
        CorruptArchive,
        NoEntry,
        BadJson,
        Hang,
    }

    struct FakeSource {
        listing: Vec<String>,
        payload: String,
        step: Step,
    }

    impl FakeSource {
        fn new(step: Step, payload: &str) -> Self {
            Self {
                listing: vec!["s1".into(), "s10".into(), "s2".into()],
                payload: payload.to_string(),
                step,
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn list_snapshots(&self) -> Result<Vec<String>, FetchError> {
            match self.step {
                Step::ListFails => Err(FetchError::Status(502)),
                Step::EmptyListing => Ok(vec![]),
                Step::Hang => std::future::pending().await,
                _ => Ok(self.listing.clone()),
            }
        }

        async fn fetch_snapshot(&self, id: &str) -> Result<Vec<u8>, FetchError> {
            assert_eq!(id, "s2");
            match self.step {
                Step::FetchFails => Err(FetchError::Status(500)),
                Step::CorruptArchive => Ok(b"PK-not-really".to_vec()),
                Step::NoEntry => Ok(zip_with(&[("other.json", self.payload.as_bytes())])),
                Step::BadJson => Ok(zip_with(&[("data.json", b"{\"data\":[]}")])),
                _ => Ok(zip_with(&[("data.json", self.payload.as_bytes())])),
            }
        }
    }

    fn refresh_loop(step: Step, cache: Arc<PublishedCache>) -> RefreshLoop {
        RefreshLoop::new(
            Arc::new(FakeSource::new(step, ONE_POOL)),
            cache,
            Arc::new(RefreshStats::default()),
            "data.json",
            Duration::from_millis(10),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn successful_pass_publishes_everything() {
        let cache = Arc::new(PublishedCache::new());
        let report = refresh_loop(Step::Ok, cache.clone()).run_pass().await.unwrap();

        assert_eq!(report.snapshot_id, "s2");
        assert_eq!(report.pools, 1);
        assert!(cache.read(ITEMS_KEY).contains("<td>2.500000</td><td>0.400000</td>"));
        assert!(!cache.read(LAST_DATA_KEY).is_empty());

        let summary: PoolSummary = serde_json::from_str(&cache.read(&pool_key("A-B"))).unwrap();
        assert_eq!(summary.total_apr, "10");
        assert_eq!(summary.price_rev, "0.400000");
    }

    #[tokio::test]
    async fn failing_steps_leave_cache_untouched() {
        for step in [
            Step::ListFails,
            Step::EmptyListing,
            Step::FetchFails,
            Step::CorruptArchive,
            Step::NoEntry,
            Step::BadJson,
        ] {
            let cache = Arc::new(PublishedCache::new());
            cache.publish_batch(vec![
                (ITEMS_KEY.to_string(), "previous table".to_string()),
                (LAST_DATA_KEY.to_string(), "previous blob".to_string()),
            ]);
            let before = cache.snapshot();

            assert!(refresh_loop(step, cache.clone()).run_pass().await.is_err());
            assert_eq!(*cache.snapshot(), *before);
        }
    }

    #[tokio::test]
    async fn dropped_pool_disappears_on_next_pass() {
        let cache = Arc::new(PublishedCache::new());
        refresh_loop(Step::Ok, cache.clone()).run_pass().await.unwrap();
        assert!(!cache.read(&pool_key("A-B")).is_empty());

        let next = r#"{"data":{"lpList":[{"symbol":"C-D","coinA":{},"coinB":{},"price":"4"}]}}"#;
        let refresh = RefreshLoop::new(
            Arc::new(FakeSource::new(Step::Ok, next)),
            cache.clone(),
            Arc::new(RefreshStats::default()),
            "data.json",
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        refresh.run_pass().await.unwrap();

        assert_eq!(cache.read(&pool_key("A-B")), "");
        assert!(!cache.read(&pool_key("C-D")).is_empty());
        assert!(!cache.read(ITEMS_KEY).contains("2.500000"));
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn cancel_interrupts_stalled_fetch() {
        let cache = Arc::new(PublishedCache::new());
        let cancel = CancellationToken::new();
        let refresh = RefreshLoop::new(
            Arc::new(FakeSource::new(Step::Hang, ONE_POOL)),
            cache.clone(),
            Arc::new(RefreshStats::default()),
            "data.json",
            Duration::from_millis(5),
            cancel.clone(),
        );

        let task = tokio::spawn(refresh.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("refresh loop ignored cancellation")
            .unwrap();
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn missing_entry_is_reported_as_such() {
        let cache = Arc::new(PublishedCache::new());
        let err = refresh_loop(Step::NoEntry, cache).run_pass().await.unwrap_err();
        assert!(matches!(err, RefreshError::MissingEntry { .. }));
    }

    #[tokio::test]
    async fn cancelled_pass_does_not_publish() {
        let cache = Arc::new(PublishedCache::new());
        let refresh = refresh_loop(Step::Ok, cache.clone());
        refresh.cancel.cancel();

        let err = refresh.run_pass().await.unwrap_err();
        assert!(matches!(err, RefreshError::Cancelled));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn run_loop_publishes_and_stops_on_cancel() {
        let cache = Arc::new(PublishedCache::new());
        let stats = Arc::new(RefreshStats::default());
        let cancel = CancellationToken::new();
        let refresh = RefreshLoop::new(
            Arc::new(FakeSource::new(Step::Ok, ONE_POOL)),
            cache.clone(),
            stats.clone(),
            "data.json",
            Duration::from_millis(10),
            cancel.clone(),
        );

        let task = tokio::spawn(refresh.run());
        for _ in 0..100 {
            if stats.succeeded.load(Ordering::Relaxed) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        assert!(stats.succeeded.load(Ordering::Relaxed) > 0);
        assert_eq!(stats.last_publish().unwrap().snapshot_id, "s2");
        assert!(!cache.read(ITEMS_KEY).is_empty());
    }

    #[tokio::test]
    async fn failures_are_counted() {
        let stats = Arc::new(RefreshStats::default());
        let cancel = CancellationToken::new();
        let refresh = RefreshLoop::new(
            Arc::new(FakeSource::new(Step::FetchFails, ONE_POOL)),
            Arc::new(PublishedCache::new()),
            stats.clone(),
            "data.json",
            Duration::from_millis(5),
            cancel.clone(),
        );

        let task = tokio::spawn(refresh.run());
        for _ in 0..100 {
            if stats.consecutive_failures.load(Ordering::Relaxed) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        assert!(stats.failed.load(Ordering::Relaxed) >= 2);
        assert_eq!(stats.succeeded.load(Ordering::Relaxed), 0);
        assert!(stats.last_publish().is_none());
    }
}
