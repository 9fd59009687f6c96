// Cache key construction and shared TTL constants
//
// Every Redis key the service touches is built here so the keyspace can be
// audited in one place.

use sha2::{Digest, Sha256};

/// Default TTL for cached link projections (24h); capped by time-to-expiry
pub const DEFAULT_LINK_TTL_SECS: u64 = 86_400;

/// Negative-cache TTL: a recent miss is served for this long
pub const NEGATIVE_TTL_SECS: u64 = 300;

/// Auth-context cache TTL
pub const AUTH_CONTEXT_TTL_SECS: u64 = 300;

/// Rate-limit bucket TTLs
pub const RATELIMIT_API_TTL_SECS: u64 = 120;
pub const RATELIMIT_IP_TTL_SECS: u64 = 10;

/// Click event log and its bounds
pub const CLICK_STREAM: &str = "stream:click_events";
pub const CLICK_STREAM_MAXLEN: usize = 100_000;
pub const CLICK_DLQ: &str = "stream:click_events:dlq";
pub const CLICK_DLQ_MAXLEN: usize = 10_000;
pub const CONSUMER_GROUP: &str = "click_consumers";

pub fn link_key(short_code: &str) -> String {
    format!("link:{}", short_code)
}

pub fn link_negative_key(short_code: &str) -> String {
    format!("link:{}:neg", short_code)
}

pub fn clicks_key(short_code: &str) -> String {
    format!("clicks:{}", short_code)
}

pub const CLICKS_PATTERN: &str = "clicks:*";

pub fn short_code_from_clicks_key(key: &str) -> Option<&str> {
    key.strip_prefix("clicks:")
}

pub fn ratelimit_api_key(key_id: &uuid::Uuid) -> String {
    format!("ratelimit:apikey:{}", key_id)
}

/// Raw client addresses never appear in the keyspace; the first 8 bytes of
/// SHA-256 stand in for them
pub fn ratelimit_ip_key(client_addr: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_addr.as_bytes());
    let digest = hasher.finalize();
    format!("ratelimit:ip:{}", hex::encode(&digest[..8]))
}

pub fn auth_context_key(digest: &str) -> String {
    format!("auth:ctx:{}", digest)
}

/// Marker key gating sampled `last_used_at` writes
pub fn last_used_marker_key(key_id: &uuid::Uuid) -> String {
    format!("auth:lastused:{}", key_id)
}
