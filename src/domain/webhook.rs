// Webhook endpoints and the delivery outbox state machine

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default ceiling on delivery attempts
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Stored error messages are clipped to this length
pub const MAX_ERROR_LEN: usize = 500;

/// Event tags an endpoint may subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    Click,
    LinkCreated,
    LinkDeleted,
}

impl WebhookEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::LinkCreated => "link_created",
            Self::LinkDeleted => "link_deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "click" => Some(Self::Click),
            "link_created" => Some(Self::LinkCreated),
            "link_deleted" => Some(Self::LinkDeleted),
            _ => None,
        }
    }
}

/// A registered delivery target. The signing secret is stored only as its
/// SHA-256 digest, which doubles as the HMAC key; the plaintext secret is
/// returned exactly once at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,

    /// Hex SHA-256 of the signing secret
    #[serde(skip_serializing)]
    pub secret_hash: String,

    pub enabled: bool,
    pub event_types: Vec<WebhookEventType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WebhookEndpoint {
    pub fn subscribes_to(&self, event_type: WebhookEventType) -> bool {
        self.enabled && self.deleted_at.is_none() && self.event_types.contains(&event_type)
    }
}

/// Delivery status; success and exhausted are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
    Exhausted,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "exhausted" => Some(Self::Exhausted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Exhausted)
    }
}

/// One outbox row per (event, endpoint); uniqueness enforced in storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,

    /// Source event identifier (stream entry id for clicks)
    pub event_id: String,
    pub event_type: WebhookEventType,

    /// Canonical JSON body POSTed to the endpoint
    pub payload: serde_json::Value,

    pub status: DeliveryStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,

    pub next_retry_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookDelivery {
    pub fn new(
        endpoint_id: Uuid,
        event_id: String,
        event_type: WebhookEventType,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            endpoint_id,
            event_id,
            event_type,
            payload,
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            next_retry_at: now,
            last_attempt_at: None,
            last_status_code: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a 2xx response
    pub fn mark_success(&mut self, status_code: u16) {
        let now = Utc::now();
        self.status = DeliveryStatus::Success;
        self.attempt_count += 1;
        self.last_attempt_at = Some(now);
        self.last_status_code = Some(status_code as i32);
        self.last_error = None;
        self.updated_at = now;
    }

    /// Record a non-2xx response or transport error. Transitions to
    /// `failed` with a scheduled retry, or to `exhausted` once the attempt
    /// ceiling is reached.
    pub fn mark_failure(&mut self, status_code: Option<u16>, error: &str) {
        let now = Utc::now();
        self.attempt_count += 1;
        self.last_attempt_at = Some(now);
        self.last_status_code = status_code.map(|c| c as i32);
        self.last_error = Some(clip_error(error));
        self.updated_at = now;

        if self.attempt_count >= self.max_attempts {
            self.status = DeliveryStatus::Exhausted;
        } else {
            self.status = DeliveryStatus::Failed;
            self.next_retry_at = now + retry_backoff(self.attempt_count);
        }
    }

    /// Terminal failure outside the retry loop (endpoint gone or disabled)
    pub fn mark_exhausted(&mut self, reason: &str) {
        let now = Utc::now();
        self.status = DeliveryStatus::Exhausted;
        self.last_error = Some(clip_error(reason));
        self.updated_at = now;
    }
}

/// Backoff schedule after N completed attempts: 1m, 5m, 15m, 1h, 4h,
/// with up to 10% added jitter to spread synchronized retries.
pub fn retry_backoff(attempt_count: i32) -> Duration {
    let base_secs: i64 = match attempt_count {
        i32::MIN..=1 => 60,
        2 => 300,
        3 => 900,
        4 => 3600,
        _ => 14_400,
    };
    let jitter = (rand::random::<f64>() * 0.1 * base_secs as f64) as i64;
    Duration::seconds(base_secs + jitter)
}

fn clip_error(error: &str) -> String {
    let mut end = error.len().min(MAX_ERROR_LEN);
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> WebhookDelivery {
        WebhookDelivery::new(
            Uuid::now_v7(),
            "1700000000000-0".into(),
            WebhookEventType::Click,
            serde_json::json!({"event_type": "click"}),
        )
    }

    #[test]
    fn test_success_is_terminal() {
        let mut d = delivery();
        d.mark_success(200);
        assert_eq!(d.status, DeliveryStatus::Success);
        assert!(d.status.is_terminal());
        assert_eq!(d.attempt_count, 1);
        assert_eq!(d.last_status_code, Some(200));
    }

    #[test]
    fn test_failure_schedules_retry_then_exhausts() {
        let mut d = delivery();

        for attempt in 1..DEFAULT_MAX_ATTEMPTS {
            d.mark_failure(Some(500), "upstream 500");
            assert_eq!(d.status, DeliveryStatus::Failed, "attempt {}", attempt);
            assert!(d.next_retry_at > Utc::now());
        }

        d.mark_failure(None, "connection refused");
        assert_eq!(d.status, DeliveryStatus::Exhausted);
        assert_eq!(d.attempt_count, DEFAULT_MAX_ATTEMPTS);
        assert!(d.status.is_terminal());
    }

    #[test]
    fn test_backoff_schedule_bounds() {
        let cases = [
            (1, 60, 66),
            (2, 300, 330),
            (3, 900, 990),
            (4, 3600, 3960),
            (5, 14_400, 15_840),
        ];
        for (attempt, min_secs, max_secs) in cases {
            let d = retry_backoff(attempt).num_seconds();
            assert!(
                d >= min_secs && d <= max_secs,
                "attempt {}: {} not in [{}, {}]",
                attempt,
                d,
                min_secs,
                max_secs
            );
        }
    }

    #[test]
    fn test_error_clipping() {
        let mut d = delivery();
        d.mark_failure(Some(502), &"x".repeat(2000));
        assert_eq!(d.last_error.as_ref().unwrap().len(), MAX_ERROR_LEN);
    }

    #[test]
    fn test_subscription_requires_enabled_and_live() {
        let mut ep = WebhookEndpoint {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            url: "https://example.com/hook".into(),
            secret_hash: "d0e1f2a3".into(),
            enabled: true,
            event_types: vec![WebhookEventType::Click],
            name: None,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        assert!(ep.subscribes_to(WebhookEventType::Click));
        assert!(!ep.subscribes_to(WebhookEventType::LinkCreated));

        ep.enabled = false;
        assert!(!ep.subscribes_to(WebhookEventType::Click));

        ep.enabled = true;
        ep.deleted_at = Some(Utc::now());
        assert!(!ep.subscribes_to(WebhookEventType::Click));
    }
}
