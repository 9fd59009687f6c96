// Webhook delivery worker
//
// Polls the outbox for due pending/failed rows, signs each payload with
// the current instant and the endpoint's stored key digest, POSTs with a
// strict timeout, and advances the delivery state machine. Delivery
// trouble never surfaces to the caller that produced the event.

use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::WebhookConfig;
use crate::domain::{DeliveryStatus, PenshortError, Result, WebhookDelivery, WebhookEndpoint};
use crate::storage::WebhookRepository;

use super::policy::validate_target_url;
use super::signature::{sign_with_digest, DELIVERY_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};

pub struct WebhookWorker {
    webhooks: Arc<dyn WebhookRepository>,
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookWorker {
    pub fn new(webhooks: Arc<dyn WebhookRepository>, config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PenshortError::internal(format!("webhook client build failed: {}", e)))?;

        Ok(Self {
            webhooks,
            client,
            config,
        })
    }

    /// Long-running poll loop; the in-flight HTTP call finishes (bounded
    /// by the per-request timeout) before shutdown returns.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "webhook worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            self.tick().await;
        }

        info!("webhook worker stopped");
        Ok(())
    }

    /// One poll: fetch due deliveries and attempt each
    pub async fn tick(&self) {
        match self.webhooks.queue_depth().await {
            Ok(depth) => metrics::gauge!("webhook_queue_depth", depth as f64),
            Err(e) => warn!(error = %e, "webhook queue depth sample failed"),
        }

        let due = match self
            .webhooks
            .due_deliveries(chrono::Utc::now(), self.config.batch_size)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "outbox poll failed");
                return;
            }
        };

        for mut delivery in due {
            self.attempt(&mut delivery).await;
            if let Err(e) = self.webhooks.update_delivery(&delivery).await {
                warn!(delivery_id = %delivery.id, error = %e, "delivery state update failed");
            }
        }
    }

    async fn attempt(&self, delivery: &mut WebhookDelivery) {
        let started = Instant::now();

        let endpoint = match self.webhooks.get_endpoint(delivery.endpoint_id).await {
            Ok(Some(ep)) => ep,
            Ok(None) => {
                delivery.mark_exhausted("endpoint no longer exists");
                self.record_outcome(delivery, None, started);
                return;
            }
            Err(e) => {
                // Transient store trouble: leave the row untouched for the
                // next poll
                warn!(delivery_id = %delivery.id, error = %e, "endpoint load failed");
                return;
            }
        };

        if !endpoint.enabled || endpoint.deleted_at.is_some() {
            delivery.mark_exhausted("endpoint disabled");
            self.record_outcome(delivery, Some(&endpoint), started);
            return;
        }

        // Re-check at delivery time; registration-time state can rot
        if let Err(e) = validate_target_url(&endpoint.url, self.config.allow_insecure) {
            delivery.mark_exhausted(&format!("target rejected: {}", e));
            self.record_outcome(delivery, Some(&endpoint), started);
            return;
        }

        let body = delivery.payload.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_with_digest(&endpoint.secret_hash, timestamp, &body);

        let response = self
            .client
            .post(&endpoint.url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(DELIVERY_ID_HEADER, delivery.id.to_string())
            .body(body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                delivery.mark_success(resp.status().as_u16());
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                delivery.mark_failure(Some(status), &format!("endpoint returned {}", status));
            }
            Err(e) => {
                delivery.mark_failure(None, &format!("transport error: {}", e));
            }
        }

        self.record_outcome(delivery, Some(&endpoint), started);
    }

    fn record_outcome(
        &self,
        delivery: &WebhookDelivery,
        endpoint: Option<&WebhookEndpoint>,
        started: Instant,
    ) {
        let endpoint_label = endpoint
            .map(|ep| ep.id.to_string())
            .unwrap_or_else(|| delivery.endpoint_id.to_string());

        metrics::histogram!(
            "webhook_attempt_duration_seconds",
            started.elapsed().as_secs_f64(),
            "endpoint" => endpoint_label.clone()
        );

        let counter = match delivery.status {
            DeliveryStatus::Success => "webhook_deliveries_success_total",
            DeliveryStatus::Exhausted => "webhook_deliveries_exhausted_total",
            _ => "webhook_deliveries_failed_total",
        };
        metrics::counter!(counter, 1, "endpoint" => endpoint_label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WebhookEventType;
    use uuid::Uuid;

    #[test]
    fn test_state_machine_drives_requeue() {
        let mut d = WebhookDelivery::new(
            Uuid::now_v7(),
            "1-0".into(),
            WebhookEventType::Click,
            serde_json::json!({}),
        );
        assert_eq!(d.status, DeliveryStatus::Pending);

        d.mark_failure(Some(500), "boom");
        assert_eq!(d.status, DeliveryStatus::Failed);
        assert!(d.next_retry_at > chrono::Utc::now());

        d.mark_success(200);
        assert!(d.status.is_terminal());
    }
}
