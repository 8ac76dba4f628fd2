//! Background refresh of the least recently updated module

use tokio::time::Interval;
use tokio_util::sync::CancellationToken;

use crate::analyzer::{ScanAnalyzer, SourceAnalyzer};
use crate::crawl::Crawler;
use crate::error::Result;
use crate::storage::Module;

pub struct Sweeper<A: SourceAnalyzer = ScanAnalyzer> {
    crawler: Crawler<A>,
}

impl<A: SourceAnalyzer> Sweeper<A> {
    pub fn new(crawler: Crawler<A>) -> Self {
        Self { crawler }
    }

    /// Re-crawl the module updated longest ago. Returns the module that was
    /// swept, or `None` when the index is empty.
    pub async fn tick(&self) -> Result<Option<Module>> {
        let Some(oldest) = self.crawler.database().oldest_module().await? else {
            tracing::debug!("Nothing to sweep");
            return Ok(None);
        };
        tracing::info!(
            "Sweeping {} (last updated {})",
            oldest.module_path,
            oldest.updated_at
        );
        self.crawler.crawl(&oldest.module_path).await.map(Some)
    }

    /// Sweep on every tick of `ticker` until `cancel` fires. Failed sweeps are
    /// logged and the loop carries on.
    pub async fn run(&self, mut ticker: Interval, cancel: CancellationToken) {
        tracing::info!("Sweeper started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("Sweep failed: {}", e);
                    }
                }
            }
        }
        tracing::info!("Sweeper stopped");
    }
}
