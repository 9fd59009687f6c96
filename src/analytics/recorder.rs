// Click side effects, detached from the redirect response
//
// One spawned task per redirect: bump the cache counter, publish the
// event (bounded, droppable), then fan the event out to the webhook
// outbox. Nothing here can fail the redirect.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::cache::LinkCache;
use crate::domain::{
    sanitize_referrer, truncate_field, visitor_hash, ClickEventPayload, Link,
};
use crate::storage::LinkRepository;
use crate::webhooks::{enqueue_click_best_effort, ClickEventBody, WebhookOutbox};

use super::publisher::AnalyticsPublisher;

/// Request-side facts captured before the response is sent
#[derive(Debug, Clone)]
pub struct ClickRequest {
    pub client_addr: String,
    pub user_agent: String,
    pub referrer: String,
    /// Two-letter code from the upstream proxy header, if present
    pub country_code: Option<String>,
}

#[derive(Clone)]
pub struct ClickRecorder {
    cache: LinkCache,
    publisher: AnalyticsPublisher,
    outbox: WebhookOutbox,
    links: Arc<dyn LinkRepository>,
}

impl ClickRecorder {
    pub fn new(
        cache: LinkCache,
        publisher: AnalyticsPublisher,
        outbox: WebhookOutbox,
        links: Arc<dyn LinkRepository>,
    ) -> Self {
        Self {
            cache,
            publisher,
            outbox,
            links,
        }
    }

    /// Fire-and-forget: spawn the side effects and return immediately
    pub fn record(&self, link: Link, request: ClickRequest) {
        let recorder = self.clone();
        tokio::spawn(async move {
            recorder.record_inner(link, request).await;
        });
    }

    async fn record_inner(&self, link: Link, request: ClickRequest) {
        if let Err(e) = self.cache.increment_clicks(&link.short_code).await {
            warn!(short_code = %link.short_code, error = %e, "click counter bump failed");
        }

        let now = Utc::now();
        let payload = ClickEventPayload {
            short_code: link.short_code.clone(),
            link_id: link.id,
            referrer: sanitize_referrer(&request.referrer),
            user_agent: truncate_field(&request.user_agent),
            visitor_hash: visitor_hash(
                &request.client_addr,
                &request.user_agent,
                now.date_naive(),
            ),
            country_code: request
                .country_code
                .filter(|cc| cc.len() == 2)
                .map(|cc| cc.to_ascii_uppercase()),
            clicked_at_ms: now.timestamp_millis(),
        };

        // A dropped event also skips the outbox: deliveries key off the
        // event id the log assigns
        let Some(event_id) = self.publisher.publish(&payload).await else {
            return;
        };

        let owner_id = match self.resolve_owner(&link).await {
            Some(owner_id) => owner_id,
            None => return,
        };

        let body = ClickEventBody {
            short_code: payload.short_code,
            link_id: payload.link_id,
            referrer: payload.referrer,
            country_code: payload.country_code,
            clicked_at: now,
        };
        enqueue_click_best_effort(&self.outbox, owner_id, &event_id, &body).await;
    }

    /// Cache-served links carry no owner; fetch it here, off the hot path
    async fn resolve_owner(&self, link: &Link) -> Option<Uuid> {
        if !link.user_id.is_nil() {
            return Some(link.user_id);
        }
        match self.links.get_by_id(link.id).await {
            Ok(Some(stored)) => Some(stored.user_id),
            Ok(None) => None,
            Err(e) => {
                warn!(link_id = %link.id, error = %e, "owner lookup for webhook fan-out failed");
                None
            }
        }
    }
}
