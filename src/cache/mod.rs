//! Redis adapter: TTL'd keys and hashes, counters, the click event log,
//! and the scripted token bucket

pub mod keys;
pub mod link_cache;
pub mod stream;
pub mod token_bucket;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::config::{redact_url, RedisConfig};
use crate::domain::Result;

pub use link_cache::LinkCache;
pub use stream::{ClickStream, StreamMessage};
pub use token_bucket::{BucketDecision, TokenBucket};

/// Shared Redis handle. `ConnectionManager` multiplexes a reconnecting
/// connection across clones.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        info!(url = %redact_url(&config.url), "connecting to redis");
        let client = redis::Client::open(config.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        info!("redis connection ready");
        Ok(Self { manager })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection();
        Ok(conn.get(key).await?)
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    /// SET NX EX: true when this caller planted the marker
    pub async fn set_marker_nx(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.connection();
        let planted: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(planted.is_some())
    }
}
