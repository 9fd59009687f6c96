// Click-count flusher: cache counters -> links.click_count
//
// Counters are drained with GETDEL, so a failed store merge re-credits the
// cache instead of losing the clicks.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::LinkCache;
use crate::domain::Result;
use crate::storage::LinkRepository;

pub struct ClickFlusher {
    cache: LinkCache,
    links: Arc<dyn LinkRepository>,
    interval: Duration,
}

impl ClickFlusher {
    pub fn new(cache: LinkCache, links: Arc<dyn LinkRepository>) -> Self {
        Self {
            cache,
            links,
            interval: Duration::from_secs(10),
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("click flusher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.flush_once().await;
        }
        // Final sweep so counters accrued during drain are not stranded
        // until the next boot
        self.flush_once().await;
        info!("click flusher stopped");
        Ok(())
    }

    pub async fn flush_once(&self) {
        let drained = match self.cache.drain_click_counters().await {
            Ok(drained) => drained,
            Err(e) => {
                warn!(error = %e, "click counter sweep failed");
                metrics::counter!("cache_errors_total", 1);
                return;
            }
        };

        for (short_code, count) in drained {
            if let Err(e) = self.links.increment_clicks(&short_code, count).await {
                warn!(short_code = %short_code, count, error = %e, "click merge failed, re-crediting cache");
                self.cache.add_clicks(&short_code, count).await.ok();
            } else {
                metrics::counter!("clicks_flushed_total", count as u64);
            }
        }
    }
}
