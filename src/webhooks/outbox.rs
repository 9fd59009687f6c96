// Webhook outbox: one pending delivery per (event, subscribing endpoint)

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Result, WebhookDelivery, WebhookEventType};
use crate::storage::WebhookRepository;

#[derive(Clone)]
pub struct WebhookOutbox {
    webhooks: Arc<dyn WebhookRepository>,
}

/// Click fields carried into the delivery body
#[derive(Debug, Clone)]
pub struct ClickEventBody {
    pub short_code: String,
    pub link_id: Uuid,
    pub referrer: String,
    pub country_code: Option<String>,
    pub clicked_at: DateTime<Utc>,
}

impl WebhookOutbox {
    pub fn new(webhooks: Arc<dyn WebhookRepository>) -> Self {
        Self { webhooks }
    }

    /// Fan a click event out to every active endpoint of the link's owner
    /// subscribed to `click`. The unique (event, endpoint) constraint makes
    /// replays no-ops.
    pub async fn enqueue_click(
        &self,
        owner_id: Uuid,
        event_id: &str,
        body: &ClickEventBody,
    ) -> Result<u64> {
        let endpoints = self
            .webhooks
            .list_subscribed(owner_id, WebhookEventType::Click)
            .await?;
        if endpoints.is_empty() {
            return Ok(0);
        }

        let payload = click_payload(event_id, body);
        let deliveries: Vec<WebhookDelivery> = endpoints
            .iter()
            .map(|ep| {
                WebhookDelivery::new(
                    ep.id,
                    event_id.to_string(),
                    WebhookEventType::Click,
                    payload.clone(),
                )
            })
            .collect();

        let created = self.webhooks.create_deliveries(&deliveries).await?;
        if created > 0 {
            debug!(event_id, created, "webhook deliveries enqueued");
            metrics::counter!("webhook_deliveries_enqueued_total", created);
        }
        Ok(created)
    }
}

/// Canonical JSON body shared by every delivery of one event
fn click_payload(event_id: &str, body: &ClickEventBody) -> serde_json::Value {
    serde_json::json!({
        "event_type": "click",
        "event_id": event_id,
        "timestamp": body.clicked_at.to_rfc3339(),
        "data": {
            "short_code": body.short_code,
            "link_id": body.link_id,
            "referrer": body.referrer,
            "country_code": body.country_code,
        }
    })
}

/// Best-effort wrapper used from the detached click task: outbox failures
/// are logged and counted, never surfaced to the redirect
pub async fn enqueue_click_best_effort(
    outbox: &WebhookOutbox,
    owner_id: Uuid,
    event_id: &str,
    body: &ClickEventBody,
) {
    if let Err(e) = outbox.enqueue_click(owner_id, event_id, body).await {
        warn!(event_id, error = %e, "webhook outbox insert failed");
        metrics::counter!("webhook_outbox_errors_total", 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_payload_shape() {
        let link_id = Uuid::now_v7();
        let body = ClickEventBody {
            short_code: "hello".into(),
            link_id,
            referrer: "https://example.com/".into(),
            country_code: Some("US".into()),
            clicked_at: Utc::now(),
        };

        let payload = click_payload("1700000000000-0", &body);
        assert_eq!(payload["event_type"], "click");
        assert_eq!(payload["event_id"], "1700000000000-0");
        assert_eq!(payload["data"]["short_code"], "hello");
        assert_eq!(payload["data"]["link_id"], serde_json::json!(link_id));
        assert_eq!(payload["data"]["country_code"], "US");
        assert!(payload["timestamp"].is_string());
    }
}
