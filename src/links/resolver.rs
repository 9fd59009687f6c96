// Cache-first redirect resolution
//
// Hot path: cached projection, then negative cache, then the store with a
// cache backfill. Cache errors fall through to the store; only the store
// being down fails a redirect.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::LinkCache;
use crate::domain::{Link, PenshortError, Result};
use crate::storage::LinkRepository;

#[derive(Clone)]
pub struct RedirectResolver {
    links: Arc<dyn LinkRepository>,
    cache: LinkCache,
}

impl RedirectResolver {
    pub fn new(links: Arc<dyn LinkRepository>, cache: LinkCache) -> Self {
        Self { links, cache }
    }

    /// Resolve a short code to a redirectable link.
    ///
    /// Errors: `NotFound` for absent or soft-deleted codes, `Disabled` and
    /// `Expired` for links that exist but must not redirect. Expired links
    /// are evicted from the cache on detection.
    pub async fn resolve(&self, short_code: &str) -> Result<Link> {
        // 1. Cached projection
        match self.cache.get(short_code).await {
            Ok(Some(cached)) => {
                debug!(short_code, "redirect cache hit");
                metrics::counter!("redirect_cache_hits_total", 1);
                let link = cached.to_link(short_code)?;
                return self.validate(link).await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(short_code, error = %e, "link cache read failed, falling through");
                metrics::counter!("cache_errors_total", 1);
            }
        }

        // 2. Negative cache absorbs repeated misses
        match self.cache.is_negative(short_code).await {
            Ok(true) => {
                metrics::counter!("redirect_negative_hits_total", 1);
                return Err(PenshortError::not_found(format!("link {}", short_code)));
            }
            Ok(false) => {}
            Err(e) => {
                warn!(short_code, error = %e, "negative cache read failed");
            }
        }

        metrics::counter!("redirect_cache_misses_total", 1);

        // 3. Authoritative lookup
        let link = match self.links.get_by_code(short_code).await? {
            Some(link) => link,
            None => {
                self.cache.set_negative(short_code).await.ok();
                return Err(PenshortError::not_found(format!("link {}", short_code)));
            }
        };

        // 4. Backfill before validation so even a disabled link stops
        // hammering the store
        if let Err(e) = self.cache.set(&link).await {
            warn!(short_code, error = %e, "cache backfill failed");
        }

        self.validate(link).await
    }

    /// Shared validation for cached and stored links: deleted is
    /// indistinguishable from absent; disabled and expired are explicit
    /// signals (410 at the HTTP layer).
    async fn validate(&self, link: Link) -> Result<Link> {
        if link.is_deleted() {
            // A stale projection may outlive the soft delete; drop it
            self.cache.invalidate(&link.short_code).await.ok();
            return Err(PenshortError::not_found(format!("link {}", link.short_code)));
        }
        if !link.enabled {
            return Err(PenshortError::Disabled(link.short_code));
        }
        if link.is_expired() {
            self.cache.invalidate(&link.short_code).await.ok();
            metrics::counter!("redirect_expired_evictions_total", 1);
            return Err(PenshortError::Expired(link.short_code));
        }
        Ok(link)
    }
}
