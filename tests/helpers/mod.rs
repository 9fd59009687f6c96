// In-memory repository implementations backing hermetic integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

use penshort::domain::{
    ClickEvent, DeliveryStatus, Result, WebhookDelivery, WebhookEndpoint, WebhookEventType,
};
use penshort::storage::{ClickEventRepository, WebhookRepository};

/// Click-event store honoring the unique `event_id` constraint
#[derive(Default)]
pub struct InMemoryClickEvents {
    pub events: Mutex<Vec<ClickEvent>>,
}

#[async_trait]
impl ClickEventRepository for InMemoryClickEvents {
    async fn bulk_insert(&self, events: &[ClickEvent]) -> Result<u64> {
        let mut stored = self.events.lock().unwrap();
        let existing: HashSet<String> = stored.iter().map(|e| e.event_id.clone()).collect();

        let mut inserted = 0;
        for event in events {
            if !existing.contains(&event.event_id)
                && !stored.iter().any(|e| e.event_id == event.event_id)
            {
                stored.push(event.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_recent(&self, link_id: Uuid, limit: i64) -> Result<Vec<ClickEvent>> {
        let stored = self.events.lock().unwrap();
        let mut matching: Vec<ClickEvent> = stored
            .iter()
            .filter(|e| e.link_id == link_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.clicked_at.cmp(&a.clicked_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

/// Webhook store with (event_id, endpoint_id) uniqueness
#[derive(Default)]
pub struct InMemoryWebhooks {
    pub endpoints: Mutex<Vec<WebhookEndpoint>>,
    pub deliveries: Mutex<Vec<WebhookDelivery>>,
}

#[async_trait]
impl WebhookRepository for InMemoryWebhooks {
    async fn create_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<()> {
        self.endpoints.lock().unwrap().push(endpoint.clone());
        Ok(())
    }

    async fn get_endpoint(&self, id: Uuid) -> Result<Option<WebhookEndpoint>> {
        Ok(self
            .endpoints
            .lock()
            .unwrap()
            .iter()
            .find(|ep| ep.id == id)
            .cloned())
    }

    async fn list_endpoints_by_user(&self, user_id: Uuid) -> Result<Vec<WebhookEndpoint>> {
        Ok(self
            .endpoints
            .lock()
            .unwrap()
            .iter()
            .filter(|ep| ep.user_id == user_id && ep.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn list_subscribed(
        &self,
        user_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookEndpoint>> {
        Ok(self
            .endpoints
            .lock()
            .unwrap()
            .iter()
            .filter(|ep| ep.user_id == user_id && ep.subscribes_to(event_type))
            .cloned()
            .collect())
    }

    async fn soft_delete_endpoint(&self, id: Uuid) -> Result<bool> {
        let mut endpoints = self.endpoints.lock().unwrap();
        if let Some(ep) = endpoints
            .iter_mut()
            .find(|ep| ep.id == id && ep.deleted_at.is_none())
        {
            ep.deleted_at = Some(Utc::now());
            ep.enabled = false;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn create_deliveries(&self, deliveries: &[WebhookDelivery]) -> Result<u64> {
        let mut stored = self.deliveries.lock().unwrap();
        let mut inserted = 0;
        for delivery in deliveries {
            let duplicate = stored
                .iter()
                .any(|d| d.event_id == delivery.event_id && d.endpoint_id == delivery.endpoint_id);
            if !duplicate {
                stored.push(delivery.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn due_deliveries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WebhookDelivery>> {
        let stored = self.deliveries.lock().unwrap();
        let mut due: Vec<WebhookDelivery> = stored
            .iter()
            .filter(|d| {
                matches!(d.status, DeliveryStatus::Pending | DeliveryStatus::Failed)
                    && d.next_retry_at <= now
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_retry_at.cmp(&b.next_retry_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        let mut stored = self.deliveries.lock().unwrap();
        if let Some(existing) = stored.iter_mut().find(|d| d.id == delivery.id) {
            *existing = delivery.clone();
        }
        Ok(())
    }

    async fn queue_depth(&self) -> Result<i64> {
        Ok(self
            .deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| matches!(d.status, DeliveryStatus::Pending | DeliveryStatus::Failed))
            .count() as i64)
    }
}

/// A live endpoint subscribed to clicks, pointed at `url`
pub fn test_endpoint(user_id: Uuid, url: &str, secret: &str) -> WebhookEndpoint {
    let now = Utc::now();
    WebhookEndpoint {
        id: Uuid::now_v7(),
        user_id,
        url: url.to_string(),
        secret_hash: penshort::webhooks::secret_digest(secret),
        enabled: true,
        event_types: vec![WebhookEventType::Click],
        name: Some("test receiver".into()),
        description: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}
