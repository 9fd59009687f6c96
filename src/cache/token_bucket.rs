// Server-side atomic token bucket
//
// The refill-and-take step runs as a single Lua script so concurrent
// callers on the same key never interleave. State is a hash of
// {tokens, last_update} with a policy-supplied TTL.

use once_cell::sync::Lazy;
use redis::Script;

use crate::domain::Result;

use super::RedisCache;

/// KEYS[1] bucket key; ARGV: rate (tokens/sec), capacity, now (unix secs), ttl
static BUCKET_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local key = KEYS[1]
local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local state = redis.call('HMGET', key, 'tokens', 'last_update')
local tokens = tonumber(state[1])
local last_update = tonumber(state[2])

if tokens == nil or last_update == nil then
    tokens = capacity
    last_update = now
end

local elapsed = now - last_update
if elapsed < 0 then
    elapsed = 0
end
tokens = math.min(capacity, tokens + elapsed * rate)

local allowed = 0
local retry_after = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
else
    retry_after = math.ceil((1 - tokens) / rate)
end

redis.call('HSET', key, 'tokens', tokens, 'last_update', now)
redis.call('EXPIRE', key, ttl)

return {allowed, retry_after, math.floor(tokens)}
"#,
    )
});

/// Outcome of one bucket take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketDecision {
    pub allowed: bool,
    /// Seconds until a token becomes available; 0 when allowed
    pub retry_after: u64,
    /// Whole tokens left after this call
    pub remaining: u64,
}

#[derive(Clone)]
pub struct TokenBucket {
    cache: RedisCache,
}

impl TokenBucket {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    /// Take one token from the bucket at `key`, refilling at `rate`
    /// tokens/sec up to `capacity`
    pub async fn take(
        &self,
        key: &str,
        rate: f64,
        capacity: u64,
        ttl_secs: u64,
    ) -> Result<BucketDecision> {
        let mut conn = self.cache.connection();
        let now = chrono::Utc::now().timestamp();

        let (allowed, retry_after, remaining): (i64, i64, i64) = BUCKET_SCRIPT
            .key(key)
            .arg(rate)
            .arg(capacity)
            .arg(now)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        Ok(BucketDecision {
            allowed: allowed == 1,
            retry_after: retry_after.max(0) as u64,
            remaining: remaining.max(0) as u64,
        })
    }
}

/// Pure mirror of the script's arithmetic. The script is authoritative at
/// runtime; this function backs the property tests.
pub fn simulate_take(
    tokens: &mut f64,
    last_update: &mut i64,
    rate: f64,
    capacity: u64,
    now: i64,
) -> BucketDecision {
    let elapsed = (now - *last_update).max(0) as f64;
    *tokens = (*tokens + elapsed * rate).min(capacity as f64);
    *last_update = now;

    if *tokens >= 1.0 {
        *tokens -= 1.0;
        BucketDecision {
            allowed: true,
            retry_after: 0,
            remaining: tokens.floor() as u64,
        }
    } else {
        BucketDecision {
            allowed: false,
            retry_after: ((1.0 - *tokens) / rate).ceil() as u64,
            remaining: 0,
        }
    }
}
