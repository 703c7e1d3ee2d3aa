use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::sources::{RemoteSnapshotSource, SnapshotSource};
use super::{PublishedCache, RefreshLoop, RefreshStats};

/// The `start()`/`stop()` surface handed to whatever runs the process
/// (foreground binary or an OS service wrapper).
pub struct PoolStatsService {
    config: Config,
    source: Arc<dyn SnapshotSource>,
    cache: Arc<PublishedCache>,
    stats: Arc<RefreshStats>,
    cancel: CancellationToken,
    handle: Handle,
    tasks: Vec<JoinHandle<()>>,
}

impl PoolStatsService {
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let source = RemoteSnapshotSource::new(&config.source.base_url, config.request_timeout())?;
        Ok(Self::with_source(config, Arc::new(source)))
    }

    pub fn with_source(config: Config, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            config,
            source,
            cache: Arc::new(PublishedCache::new()),
            stats: Arc::new(RefreshStats::default()),
            cancel: CancellationToken::new(),
            handle: Handle::new(),
            tasks: Vec::new(),
        }
    }

    #[allow(dead_code)]
    pub fn cache(&self) -> Arc<PublishedCache> {
        self.cache.clone()
    }

    /// Spawns the refresh loop and the TLS listener.
    pub async fn start(&mut self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port).parse()?;

        let refresh = RefreshLoop::new(
            self.source.clone(),
            self.cache.clone(),
            self.stats.clone(),
            &self.config.source.entry_name,
            self.config.refresh_interval(),
            self.cancel.clone(),
        );
        self.tasks.push(tokio::spawn(refresh.run()));

        let state = Arc::new(AppState {
            cache: self.cache.clone(),
            stats: self.stats.clone(),
            static_root: self.config.server.static_root.clone(),
            index_file: self.config.server.index_file.clone(),
        });
        let app = api::create_rest_router(state, &self.config.routes);

        let tls = api::tls::load_or_empty(&self.config.server.tls).await;
        let handle = self.handle.clone();
        self.tasks.push(tokio::spawn(async move {
            let server = axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>());
            if let Err(e) = server.await {
                tracing::error!("listener on {} failed: {}", addr, e);
            }
        }));

        match self.handle.listening().await {
            Some(bound) => {
                tracing::info!("✓ Server ready on https://{}", bound);
                Ok(bound)
            }
            None => Err(format!("listener on {} did not start", addr).into()),
        }
    }

    /// Stops the refresh loop and gives in-flight requests the configured
    /// grace period before the listener closes.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.handle
            .graceful_shutdown(Some(Duration::from_secs(self.config.server.shutdown_grace_secs)));

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("task ended abnormally: {}", e);
            }
        }
        tracing::info!("Service stopped");
    }
}
