// Cached link projections, negative entries, and click counters

use chrono::Utc;
use redis::AsyncCommands;
use tracing::debug;

use crate::domain::{CachedLink, Link, Result};

use super::keys;
use super::RedisCache;

/// Redirect-plane view of the cache: link hashes under `link:<code>`,
/// negative markers under `link:<code>:neg`, counters under `clicks:<code>`.
#[derive(Clone)]
pub struct LinkCache {
    cache: RedisCache,
}

impl LinkCache {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    /// Fetch the cached projection; `None` on miss or partial hash
    pub async fn get(&self, short_code: &str) -> Result<Option<CachedLink>> {
        let mut conn = self.cache.connection();
        let fields: std::collections::HashMap<String, String> =
            conn.hgetall(keys::link_key(short_code)).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let get = |name: &str| fields.get(name).cloned().unwrap_or_default();
        let redirect_type: u16 = get("redirect_type").parse().unwrap_or(302);
        let enabled = get("enabled") == "1";

        Ok(Some(CachedLink {
            link_id: get("link_id"),
            destination: get("destination"),
            redirect_type,
            expires_at: get("expires_at"),
            enabled,
            deleted_at: get("deleted_at"),
            updated_at: get("updated_at"),
        }))
    }

    /// Write the projection with a TTL bounded by the remaining lifetime
    pub async fn set(&self, link: &Link) -> Result<()> {
        let cached = CachedLink::from_link(link);
        let key = keys::link_key(&link.short_code);
        let ttl = projection_ttl_secs(link);

        let items: Vec<(&str, String)> = vec![
            ("link_id", cached.link_id),
            ("destination", cached.destination),
            ("redirect_type", cached.redirect_type.to_string()),
            ("expires_at", cached.expires_at),
            ("enabled", if cached.enabled { "1" } else { "0" }.to_string()),
            ("deleted_at", cached.deleted_at),
            ("updated_at", cached.updated_at),
        ];

        let mut conn = self.cache.connection();
        let _: () = conn.hset_multiple(&key, &items).await?;
        let _: bool = conn.expire(&key, ttl as i64).await?;

        debug!(short_code = %link.short_code, ttl_secs = ttl, "cached link projection");
        Ok(())
    }

    /// Remove the projection; used on update, delete, and expiry detection
    pub async fn invalidate(&self, short_code: &str) -> Result<()> {
        self.cache.delete(&keys::link_key(short_code)).await
    }

    pub async fn is_negative(&self, short_code: &str) -> Result<bool> {
        let mut conn = self.cache.connection();
        let exists: bool = conn.exists(keys::link_negative_key(short_code)).await?;
        Ok(exists)
    }

    /// Plant a short-lived miss marker so repeated lookups skip the store
    pub async fn set_negative(&self, short_code: &str) -> Result<()> {
        self.cache
            .set_ex(
                &keys::link_negative_key(short_code),
                "",
                keys::NEGATIVE_TTL_SECS,
            )
            .await
    }

    pub async fn clear_negative(&self, short_code: &str) -> Result<()> {
        self.cache.delete(&keys::link_negative_key(short_code)).await
    }

    /// Non-blocking click counter bump on the redirect path
    pub async fn increment_clicks(&self, short_code: &str) -> Result<i64> {
        self.add_clicks(short_code, 1).await
    }

    /// Credit a counter by an arbitrary delta; used when a store merge
    /// fails after the sweep already drained the key
    pub async fn add_clicks(&self, short_code: &str, delta: i64) -> Result<i64> {
        let mut conn = self.cache.connection();
        let count: i64 = conn.incr(keys::clicks_key(short_code), delta).await?;
        Ok(count)
    }

    /// Sweep all click counters with SCAN + GETDEL, returning
    /// (short_code, count) pairs ready to merge into the store
    pub async fn drain_click_counters(&self) -> Result<Vec<(String, i64)>> {
        let mut conn = self.cache.connection();
        let mut drained = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(keys::CLICKS_PATTERN)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            for key in batch {
                let value: Option<String> = redis::cmd("GETDEL")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await?;
                if let (Some(code), Some(raw)) =
                    (keys::short_code_from_clicks_key(&key), value)
                {
                    if let Ok(count) = raw.parse::<i64>() {
                        if count > 0 {
                            drained.push((code.to_string(), count));
                        }
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(drained)
    }
}

/// TTL = min(default 24h, time to expiration), at least 1s
fn projection_ttl_secs(link: &Link) -> u64 {
    match link.expires_at {
        Some(expires_at) => {
            let remaining = (expires_at - Utc::now()).num_seconds().max(1) as u64;
            remaining.min(keys::DEFAULT_LINK_TTL_SECS)
        }
        None => keys::DEFAULT_LINK_TTL_SECS,
    }
}
