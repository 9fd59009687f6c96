// Row structs mapping table shapes onto domain types

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    ApiKey, ClickEvent, DailyLinkStats, DeliveryStatus, Link, PenshortError, RedirectType, Result,
    Scope, Tier, User, WebhookDelivery, WebhookEndpoint, WebhookEventType,
};

#[derive(Debug, FromRow)]
pub struct LinkRow {
    pub id: Uuid,
    pub short_code: String,
    pub destination: String,
    pub redirect_type: i32,
    pub user_id: Uuid,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub click_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkRow {
    pub fn into_link(self) -> Result<Link> {
        Ok(Link {
            id: self.id,
            short_code: self.short_code,
            destination: self.destination,
            redirect_type: RedirectType::try_from(self.redirect_type as u16)
                .map_err(PenshortError::internal)?,
            user_id: self.user_id,
            enabled: self.enabled,
            expires_at: self.expires_at,
            deleted_at: self.deleted_at,
            click_count: self.click_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ApiKeyRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_hash: String,
    pub prefix: String,
    pub scopes: Vec<String>,
    pub tier: String,
    pub name: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyRow {
    pub fn into_api_key(self) -> Result<ApiKey> {
        let scopes = self
            .scopes
            .iter()
            .map(|s| {
                Scope::parse(s)
                    .ok_or_else(|| PenshortError::internal(format!("unknown scope '{}'", s)))
            })
            .collect::<Result<Vec<_>>>()?;
        let tier = Tier::parse(&self.tier)
            .ok_or_else(|| PenshortError::internal(format!("unknown tier '{}'", self.tier)))?;

        Ok(ApiKey {
            id: self.id,
            user_id: self.user_id,
            key_hash: self.key_hash,
            prefix: self.prefix,
            scopes,
            tier,
            name: self.name,
            revoked_at: self.revoked_at,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ClickEventRow {
    pub id: Uuid,
    pub event_id: String,
    pub short_code: String,
    pub link_id: Uuid,
    pub referrer: String,
    pub user_agent: String,
    pub visitor_hash: String,
    pub country_code: Option<String>,
    pub clicked_at: DateTime<Utc>,
    pub inserted_at: DateTime<Utc>,
}

impl ClickEventRow {
    pub fn into_event(self) -> ClickEvent {
        ClickEvent {
            id: self.id,
            event_id: self.event_id,
            short_code: self.short_code,
            link_id: self.link_id,
            referrer: self.referrer,
            user_agent: self.user_agent,
            visitor_hash: self.visitor_hash,
            country_code: self.country_code,
            clicked_at: self.clicked_at,
            inserted_at: self.inserted_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DailyStatsRow {
    pub id: Uuid,
    pub link_id: Uuid,
    pub date: NaiveDate,
    pub total_clicks: i64,
    pub unique_visitors: i64,
    pub referrers: serde_json::Value,
    pub countries: serde_json::Value,
    pub user_agents: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyStatsRow {
    pub fn into_stats(self) -> DailyLinkStats {
        DailyLinkStats {
            id: self.id,
            link_id: self.link_id,
            date: self.date,
            total_clicks: self.total_clicks,
            unique_visitors: self.unique_visitors,
            referrers: serde_json::from_value(self.referrers).unwrap_or_default(),
            countries: serde_json::from_value(self.countries).unwrap_or_default(),
            user_agents: serde_json::from_value(self.user_agents).unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct WebhookEndpointRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub secret_hash: String,
    pub enabled: bool,
    pub event_types: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WebhookEndpointRow {
    pub fn into_endpoint(self) -> Result<WebhookEndpoint> {
        let event_types = self
            .event_types
            .iter()
            .map(|s| {
                WebhookEventType::parse(s)
                    .ok_or_else(|| PenshortError::internal(format!("unknown event type '{}'", s)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(WebhookEndpoint {
            id: self.id,
            user_id: self.user_id,
            url: self.url,
            secret_hash: self.secret_hash,
            enabled: self.enabled,
            event_types,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct WebhookDeliveryRow {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_retry_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_status_code: Option<i32>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookDeliveryRow {
    pub fn into_delivery(self) -> Result<WebhookDelivery> {
        let event_type = WebhookEventType::parse(&self.event_type).ok_or_else(|| {
            PenshortError::internal(format!("unknown event type '{}'", self.event_type))
        })?;
        let status = DeliveryStatus::parse(&self.status).ok_or_else(|| {
            PenshortError::internal(format!("unknown delivery status '{}'", self.status))
        })?;

        Ok(WebhookDelivery {
            id: self.id,
            endpoint_id: self.endpoint_id,
            event_id: self.event_id,
            event_type,
            payload: self.payload,
            status,
            attempt_count: self.attempt_count,
            max_attempts: self.max_attempts,
            next_retry_at: self.next_retry_at,
            last_attempt_at: self.last_attempt_at,
            last_status_code: self.last_status_code,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
