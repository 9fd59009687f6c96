//! Two-tier rate limiting over one scripted token bucket
//!
//! The per-key policy reads its rate and burst from the key's tier; the
//! per-address policy comes from configuration. Both share the same Lua
//! primitive, so a decision is one round trip. Limiter failures fail open.

use tracing::warn;
use uuid::Uuid;

use crate::cache::{keys, BucketDecision, TokenBucket};
use crate::config::RateLimitConfig;
use crate::domain::Tier;

/// Decision surfaced to the HTTP layer as `X-RateLimit-*` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests per window advertised in `X-RateLimit-Limit`
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds when a denied caller may retry
    pub reset: i64,
    /// Seconds for `Retry-After`; 0 when allowed
    pub retry_after: u64,
}

impl RateLimitDecision {
    fn bypass() -> Self {
        Self {
            allowed: true,
            limit: 0,
            remaining: 0,
            reset: 0,
            retry_after: 0,
        }
    }

    fn from_bucket(decision: BucketDecision, limit: u64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            allowed: decision.allowed,
            limit,
            remaining: decision.remaining,
            reset: now + decision.retry_after.max(1) as i64,
            retry_after: decision.retry_after,
        }
    }

    /// Whether the policy produced real numbers worth emitting as headers
    pub fn has_headers(&self) -> bool {
        self.limit > 0
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    bucket: TokenBucket,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(bucket: TokenBucket, config: RateLimitConfig) -> Self {
        Self { bucket, config }
    }

    /// Per-API-key policy; rate and burst looked up from the tier.
    /// Unlimited short-circuits without touching the cache.
    pub async fn check_api_key(&self, key_id: Uuid, tier: Tier) -> RateLimitDecision {
        if !self.config.api_enabled {
            return RateLimitDecision::bypass();
        }
        let Some((per_minute, burst)) = tier.limits() else {
            return RateLimitDecision::bypass();
        };

        let rate = per_minute as f64 / 60.0;
        let key = keys::ratelimit_api_key(&key_id);
        self.take(&key, rate, burst, keys::RATELIMIT_API_TTL_SECS, per_minute)
            .await
    }

    /// Per-client-address policy for the redirect plane
    pub async fn check_client_addr(&self, client_addr: &str) -> RateLimitDecision {
        if !self.config.redirect_enabled {
            return RateLimitDecision::bypass();
        }

        let rate = self.config.redirect_rps as f64;
        let key = keys::ratelimit_ip_key(client_addr);
        self.take(
            &key,
            rate,
            self.config.redirect_burst,
            keys::RATELIMIT_IP_TTL_SECS,
            self.config.redirect_rps,
        )
        .await
    }

    async fn take(
        &self,
        key: &str,
        rate: f64,
        burst: u64,
        ttl_secs: u64,
        limit: u64,
    ) -> RateLimitDecision {
        match self.bucket.take(key, rate, burst, ttl_secs).await {
            Ok(decision) => {
                if !decision.allowed {
                    metrics::counter!("ratelimit_denied_total", 1);
                }
                RateLimitDecision::from_bucket(decision, limit)
            }
            Err(e) => {
                // Fail open: losing the limiter must not take down the API
                warn!(error = %e, "rate limiter unavailable, allowing request");
                metrics::counter!("ratelimit_errors_total", 1);
                RateLimitDecision::bypass()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BucketDecision;

    #[test]
    fn test_decision_headers() {
        let d = RateLimitDecision::from_bucket(
            BucketDecision {
                allowed: true,
                retry_after: 0,
                remaining: 7,
            },
            60,
        );
        assert!(d.allowed);
        assert_eq!(d.limit, 60);
        assert_eq!(d.remaining, 7);
        assert!(d.has_headers());

        let denied = RateLimitDecision::from_bucket(
            BucketDecision {
                allowed: false,
                retry_after: 3,
                remaining: 0,
            },
            60,
        );
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, 3);
        assert!(denied.reset > chrono::Utc::now().timestamp());
    }

    #[test]
    fn test_bypass_has_no_headers() {
        let d = RateLimitDecision::bypass();
        assert!(d.allowed);
        assert!(!d.has_headers());
    }
}
