// API request/response shapes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{ApiKey, Link, LinkStatus, Scope, Tier, WebhookEndpoint, WebhookEventType};

/// Pagination query: 1-based `page`, bounded `per_page`
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: i64, per_page: i64, total_items: i64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + per_page - 1) / per_page
        };
        Self {
            data,
            pagination: PaginationMeta {
                page,
                per_page,
                total_items,
                total_pages,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub id: Uuid,
    pub short_code: String,
    pub short_url: String,
    pub destination: String,
    pub redirect_type: u16,
    pub status: LinkStatus,
    pub click_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkResponse {
    pub fn from_link(link: &Link, base_url: &str) -> Self {
        Self {
            id: link.id,
            short_code: link.short_code.clone(),
            short_url: format!("{}/{}", base_url.trim_end_matches('/'), link.short_code),
            destination: link.destination.clone(),
            redirect_type: link.redirect_type.status_code(),
            status: link.status(),
            click_count: link.click_count,
            expires_at: link.expires_at,
            created_at: link.created_at,
            updated_at: link.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to the calling key's owner
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// Creation response carries the plaintext exactly once
#[derive(Debug, Serialize)]
pub struct CreatedApiKeyResponse {
    pub id: Uuid,
    pub key: String,
    pub prefix: String,
    pub scopes: Vec<Scope>,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Listing shape: no plaintext, ever
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub prefix: String,
    pub scopes: Vec<Scope>,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyResponse {
    pub fn from_key(key: &ApiKey) -> Self {
        Self {
            id: key.id,
            prefix: key.prefix.clone(),
            scopes: key.scopes.clone(),
            tier: key.tier,
            name: key.name.clone(),
            revoked_at: key.revoked_at,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RotatedApiKeyResponse {
    #[serde(flatten)]
    pub key: CreatedApiKeyResponse,
    pub revoked_key_id: Uuid,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    pub event_types: Vec<WebhookEventType>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Registration response carries the signing secret exactly once
#[derive(Debug, Serialize)]
pub struct CreatedWebhookResponse {
    pub id: Uuid,
    pub url: String,
    pub secret: String,
    pub event_types: Vec<WebhookEventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub url: String,
    pub enabled: bool,
    pub event_types: Vec<WebhookEventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WebhookResponse {
    pub fn from_endpoint(endpoint: &WebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url.clone(),
            enabled: endpoint.enabled,
            event_types: endpoint.event_types.clone(),
            name: endpoint.name.clone(),
            description: endpoint.description.clone(),
            created_at: endpoint.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub link_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_clicks: i64,
    pub unique_visitors: i64,
    pub days: Vec<AnalyticsDay>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsDay {
    pub date: NaiveDate,
    pub total_clicks: i64,
    pub unique_visitors: i64,
    pub referrers: HashMap<String, i64>,
    pub countries: HashMap<String, i64>,
    pub user_agents: HashMap<String, i64>,
}
