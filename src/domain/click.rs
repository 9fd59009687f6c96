// Click events and the stream payload exchanged between publisher and consumer

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::{PenshortError, Result};

/// Referrer and user-agent are truncated to this length before storage
pub const MAX_FIELD_LEN: usize = 500;

/// Namespace folded into the daily visitor salt
const VISITOR_SALT_NAMESPACE: &str = "penshort:visitor:";

/// A persisted click, one row per event-log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    pub id: Uuid,

    /// Event-log entry id; the idempotency key for persistence
    pub event_id: String,

    pub short_code: String,
    pub link_id: Uuid,

    /// Truncated, query/fragment stripped
    pub referrer: String,

    /// Truncated
    pub user_agent: String,

    /// First 16 hex chars of SHA-256(addr + ua + daily salt)
    pub visitor_hash: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,

    pub clicked_at: DateTime<Utc>,
    pub inserted_at: DateTime<Utc>,
}

/// Payload appended to the event log by the redirect handler.
/// The event-log id is assigned on append and travels separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEventPayload {
    pub short_code: String,
    pub link_id: Uuid,
    pub referrer: String,
    pub user_agent: String,
    pub visitor_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    /// Milliseconds since the Unix epoch
    pub clicked_at_ms: i64,
}

impl ClickEventPayload {
    /// Reject payloads the consumer must not persist. Failures here route
    /// the message to the dead-letter log.
    pub fn validate(&self) -> Result<()> {
        if self.short_code.is_empty() || self.link_id.is_nil() {
            return Err(PenshortError::validation("missing required field"));
        }
        if self.short_code.len() < 3 || self.short_code.len() > 50 {
            return Err(PenshortError::validation("short_code length out of range"));
        }
        if self.visitor_hash.len() != 16
            || !self.visitor_hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(PenshortError::validation("visitor_hash must be 16 hex chars"));
        }
        if self.clicked_at_ms <= 0 {
            return Err(PenshortError::validation("missing click instant"));
        }
        if self.referrer.len() > MAX_FIELD_LEN || self.user_agent.len() > MAX_FIELD_LEN {
            return Err(PenshortError::validation("oversized referrer or user agent"));
        }
        if let Some(cc) = &self.country_code {
            if cc.len() != 2 {
                return Err(PenshortError::validation("country_code must be 2 chars"));
            }
        }
        Ok(())
    }

    pub fn clicked_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clicked_at_ms).unwrap_or_else(Utc::now)
    }

    /// UTC date the click falls on, for daily aggregation
    pub fn clicked_date(&self) -> NaiveDate {
        self.clicked_at().date_naive()
    }
}

/// Privacy-preserving per-day visitor identifier: SHA-256 over
/// client-address, user-agent, and a salt that rotates at UTC midnight.
pub fn visitor_hash(client_addr: &str, user_agent: &str, date: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_addr.as_bytes());
    hasher.update(user_agent.as_bytes());
    hasher.update(VISITOR_SALT_NAMESPACE.as_bytes());
    hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Truncate to the storage bound on a char boundary
pub fn truncate_field(value: &str) -> String {
    if value.len() <= MAX_FIELD_LEN {
        return value.to_string();
    }
    let mut end = MAX_FIELD_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Strip query and fragment from a referrer before storage
pub fn sanitize_referrer(referrer: &str) -> String {
    let base = match url::Url::parse(referrer) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        // Not a URL; keep as-is minus anything after ? or #
        Err(_) => referrer
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    truncate_field(&base)
}
