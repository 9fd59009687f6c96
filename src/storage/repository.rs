// Repository traits and their Postgres implementations
//
// Traits are the seams the services and workers depend on; tests substitute
// in-memory implementations.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    ApiKey, ClickEvent, DailyLinkStats, Link, PenshortError, Result, StatsDelta, User,
    WebhookDelivery, WebhookEndpoint, WebhookEventType,
};

use super::models::{
    ApiKeyRow, ClickEventRow, DailyStatsRow, LinkRow, UserRow, WebhookDeliveryRow,
    WebhookEndpointRow,
};

/// Postgres unique-violation SQLSTATE
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}

/// Page request for list endpoints; 1-based page, bounded page size
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub const MAX_PER_PAGE: i64 = 100;

    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

#[async_trait::async_trait]
pub trait LinkRepository: Send + Sync {
    async fn create(&self, link: &Link) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Link>>;
    /// Lookup by short code among non-deleted links
    async fn get_by_code(&self, short_code: &str) -> Result<Option<Link>>;
    async fn list_by_user(&self, user_id: Uuid, page: Page) -> Result<(Vec<Link>, i64)>;
    /// Persist mutable fields; bumps `updated_at`
    async fn update(&self, link: &Link) -> Result<()>;
    async fn soft_delete(&self, id: Uuid) -> Result<bool>;
    async fn increment_clicks(&self, short_code: &str, delta: i64) -> Result<()>;
}

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;
}

#[async_trait::async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create(&self, key: &ApiKey) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiKey>>;
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>>;
    /// Non-revoked candidates sharing a plaintext prefix; expected small
    async fn find_active_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>>;
    async fn revoke(&self, id: Uuid) -> Result<bool>;
    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ClickEventRepository: Send + Sync {
    /// Idempotent bulk insert keyed on `event_id`; returns rows inserted
    /// (replayed events are skipped, not errors)
    async fn bulk_insert(&self, events: &[ClickEvent]) -> Result<u64>;
    async fn list_recent(&self, link_id: Uuid, limit: i64) -> Result<Vec<ClickEvent>>;
}

#[async_trait::async_trait]
pub trait StatsRepository: Send + Sync {
    /// Conditional upsert: insert the delta or fold it into the stored row
    /// with field-level increments
    async fn upsert_delta(&self, link_id: Uuid, date: NaiveDate, delta: &StatsDelta) -> Result<()>;
    async fn get_range(
        &self,
        link_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyLinkStats>>;
}

#[async_trait::async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<()>;
    async fn get_endpoint(&self, id: Uuid) -> Result<Option<WebhookEndpoint>>;
    async fn list_endpoints_by_user(&self, user_id: Uuid) -> Result<Vec<WebhookEndpoint>>;
    /// Active endpoints of one owner subscribed to an event type
    async fn list_subscribed(
        &self,
        user_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookEndpoint>>;
    async fn soft_delete_endpoint(&self, id: Uuid) -> Result<bool>;

    /// Insert outbox rows; duplicates on (event_id, endpoint_id) are skipped
    async fn create_deliveries(&self, deliveries: &[WebhookDelivery]) -> Result<u64>;
    /// Deliveries due for an attempt, oldest first
    async fn due_deliveries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WebhookDelivery>>;
    async fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<()>;
    /// Pending + failed rows, sampled into the queue-depth gauge
    async fn queue_depth(&self) -> Result<i64>;
}

// ---------------------------------------------------------------------------
// Postgres implementations
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgLinkRepository {
    pool: PgPool,
}

impl PgLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LinkRepository for PgLinkRepository {
    async fn create(&self, link: &Link) -> Result<()> {
        debug!(short_code = %link.short_code, "inserting link");

        let res = sqlx::query(
            r#"
            INSERT INTO links (
                id, short_code, destination, redirect_type, user_id, enabled,
                expires_at, deleted_at, click_count, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(link.id)
        .bind(&link.short_code)
        .bind(&link.destination)
        .bind(link.redirect_type.status_code() as i32)
        .bind(link.user_id)
        .bind(link.enabled)
        .bind(link.expires_at)
        .bind(link.deleted_at)
        .bind(link.click_count)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(PenshortError::conflict(format!(
                "short code '{}' is already taken",
                link.short_code
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Link>> {
        let row: Option<LinkRow> = sqlx::query_as("SELECT * FROM links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(LinkRow::into_link).transpose()
    }

    async fn get_by_code(&self, short_code: &str) -> Result<Option<Link>> {
        let row: Option<LinkRow> =
            sqlx::query_as("SELECT * FROM links WHERE short_code = $1 AND deleted_at IS NULL")
                .bind(short_code)
                .fetch_optional(&self.pool)
                .await?;
        row.map(LinkRow::into_link).transpose()
    }

    async fn list_by_user(&self, user_id: Uuid, page: Page) -> Result<(Vec<Link>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM links WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<LinkRow> = sqlx::query_as(
            r#"
            SELECT * FROM links
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let links = rows
            .into_iter()
            .map(LinkRow::into_link)
            .collect::<Result<Vec<_>>>()?;
        Ok((links, total))
    }

    async fn update(&self, link: &Link) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE links SET
                destination = $2,
                redirect_type = $3,
                enabled = $4,
                expires_at = $5,
                updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(link.id)
        .bind(&link.destination)
        .bind(link.redirect_type.status_code() as i32)
        .bind(link.enabled)
        .bind(link.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE links SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn increment_clicks(&self, short_code: &str, delta: i64) -> Result<()> {
        sqlx::query(
            "UPDATE links SET click_count = click_count + $2, updated_at = now() \
             WHERE short_code = $1 AND deleted_at IS NULL",
        )
        .bind(short_code)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> Result<()> {
        let res = sqlx::query("INSERT INTO users (id, email, created_at) VALUES ($1, $2, $3)")
            .bind(user.id)
            .bind(&user.email)
            .bind(user.created_at)
            .execute(&self.pool)
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(PenshortError::conflict(format!(
                "email '{}' is already registered",
                user.email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserRow::into_user))
    }
}

#[derive(Clone)]
pub struct PgApiKeyRepository {
    pool: PgPool,
}

impl PgApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ApiKeyRepository for PgApiKeyRepository {
    async fn create(&self, key: &ApiKey) -> Result<()> {
        let scopes: Vec<String> = key.scopes.iter().map(|s| s.as_str().to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO api_keys (
                id, user_id, key_hash, prefix, scopes, tier, name,
                revoked_at, last_used_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(key.id)
        .bind(key.user_id)
        .bind(&key.key_hash)
        .bind(&key.prefix)
        .bind(&scopes)
        .bind(key.tier.as_str())
        .bind(&key.name)
        .bind(key.revoked_at)
        .bind(key.last_used_at)
        .bind(key.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiKey>> {
        let row: Option<ApiKeyRow> = sqlx::query_as("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ApiKeyRow::into_api_key).transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>> {
        let rows: Vec<ApiKeyRow> =
            sqlx::query_as("SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(ApiKeyRow::into_api_key).collect()
    }

    async fn find_active_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        let rows: Vec<ApiKeyRow> =
            sqlx::query_as("SELECT * FROM api_keys WHERE prefix = $1 AND revoked_at IS NULL")
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(ApiKeyRow::into_api_key).collect()
    }

    async fn revoke(&self, id: Uuid) -> Result<bool> {
        let res =
            sqlx::query("UPDATE api_keys SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgClickEventRepository {
    pool: PgPool,
}

impl PgClickEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClickEventRepository for PgClickEventRepository {
    async fn bulk_insert(&self, events: &[ClickEvent]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let event_ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
        let short_codes: Vec<String> = events.iter().map(|e| e.short_code.clone()).collect();
        let link_ids: Vec<Uuid> = events.iter().map(|e| e.link_id).collect();
        let referrers: Vec<String> = events.iter().map(|e| e.referrer.clone()).collect();
        let user_agents: Vec<String> = events.iter().map(|e| e.user_agent.clone()).collect();
        let visitor_hashes: Vec<String> = events.iter().map(|e| e.visitor_hash.clone()).collect();
        let countries: Vec<Option<String>> =
            events.iter().map(|e| e.country_code.clone()).collect();
        let clicked: Vec<DateTime<Utc>> = events.iter().map(|e| e.clicked_at).collect();
        let inserted: Vec<DateTime<Utc>> = events.iter().map(|e| e.inserted_at).collect();

        let res = sqlx::query(
            r#"
            INSERT INTO click_events (
                id, event_id, short_code, link_id, referrer, user_agent,
                visitor_hash, country_code, clicked_at, inserted_at
            )
            SELECT * FROM UNNEST(
                $1::uuid[], $2::text[], $3::text[], $4::uuid[], $5::text[],
                $6::text[], $7::text[], $8::text[], $9::timestamptz[], $10::timestamptz[]
            )
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&event_ids)
        .bind(&short_codes)
        .bind(&link_ids)
        .bind(&referrers)
        .bind(&user_agents)
        .bind(&visitor_hashes)
        .bind(&countries)
        .bind(&clicked)
        .bind(&inserted)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    async fn list_recent(&self, link_id: Uuid, limit: i64) -> Result<Vec<ClickEvent>> {
        let rows: Vec<ClickEventRow> = sqlx::query_as(
            "SELECT * FROM click_events WHERE link_id = $1 ORDER BY clicked_at DESC LIMIT $2",
        )
        .bind(link_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ClickEventRow::into_event).collect())
    }
}

#[derive(Clone)]
pub struct PgStatsRepository {
    pool: PgPool,
}

impl PgStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StatsRepository for PgStatsRepository {
    async fn upsert_delta(&self, link_id: Uuid, date: NaiveDate, delta: &StatsDelta) -> Result<()> {
        // Field-level increments: numeric columns add, JSONB maps merge by
        // summing per-key counts. Concurrent upserts converge without an
        // explicit lock.
        sqlx::query(
            r#"
            INSERT INTO daily_link_stats (
                id, link_id, date, total_clicks, unique_visitors,
                referrers, countries, user_agents, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())
            ON CONFLICT (link_id, date) DO UPDATE SET
                total_clicks = daily_link_stats.total_clicks + EXCLUDED.total_clicks,
                unique_visitors = daily_link_stats.unique_visitors + EXCLUDED.unique_visitors,
                referrers = (
                    SELECT COALESCE(jsonb_object_agg(key, total), '{}'::jsonb)
                    FROM (
                        SELECT key, SUM(value::bigint) AS total FROM (
                            SELECT key, value FROM jsonb_each_text(daily_link_stats.referrers)
                            UNION ALL
                            SELECT key, value FROM jsonb_each_text(EXCLUDED.referrers)
                        ) pairs GROUP BY key
                    ) merged
                ),
                countries = (
                    SELECT COALESCE(jsonb_object_agg(key, total), '{}'::jsonb)
                    FROM (
                        SELECT key, SUM(value::bigint) AS total FROM (
                            SELECT key, value FROM jsonb_each_text(daily_link_stats.countries)
                            UNION ALL
                            SELECT key, value FROM jsonb_each_text(EXCLUDED.countries)
                        ) pairs GROUP BY key
                    ) merged
                ),
                user_agents = (
                    SELECT COALESCE(jsonb_object_agg(key, total), '{}'::jsonb)
                    FROM (
                        SELECT key, SUM(value::bigint) AS total FROM (
                            SELECT key, value FROM jsonb_each_text(daily_link_stats.user_agents)
                            UNION ALL
                            SELECT key, value FROM jsonb_each_text(EXCLUDED.user_agents)
                        ) pairs GROUP BY key
                    ) merged
                ),
                updated_at = now()
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(link_id)
        .bind(date)
        .bind(delta.total_clicks)
        .bind(delta.unique_visitors)
        .bind(serde_json::to_value(&delta.referrers)?)
        .bind(serde_json::to_value(&delta.countries)?)
        .bind(serde_json::to_value(&delta.user_agents)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_range(
        &self,
        link_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyLinkStats>> {
        let rows: Vec<DailyStatsRow> = sqlx::query_as(
            r#"
            SELECT * FROM daily_link_stats
            WHERE link_id = $1 AND date >= $2 AND date <= $3
            ORDER BY date ASC
            "#,
        )
        .bind(link_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DailyStatsRow::into_stats).collect())
    }
}

#[derive(Clone)]
pub struct PgWebhookRepository {
    pool: PgPool,
}

impl PgWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WebhookRepository for PgWebhookRepository {
    async fn create_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<()> {
        let event_types: Vec<String> = endpoint
            .event_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        sqlx::query(
            r#"
            INSERT INTO webhook_endpoints (
                id, user_id, url, secret_hash, enabled, event_types,
                name, description, created_at, updated_at, deleted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(endpoint.id)
        .bind(endpoint.user_id)
        .bind(&endpoint.url)
        .bind(&endpoint.secret_hash)
        .bind(endpoint.enabled)
        .bind(&event_types)
        .bind(&endpoint.name)
        .bind(&endpoint.description)
        .bind(endpoint.created_at)
        .bind(endpoint.updated_at)
        .bind(endpoint.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_endpoint(&self, id: Uuid) -> Result<Option<WebhookEndpoint>> {
        let row: Option<WebhookEndpointRow> =
            sqlx::query_as("SELECT * FROM webhook_endpoints WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(WebhookEndpointRow::into_endpoint).transpose()
    }

    async fn list_endpoints_by_user(&self, user_id: Uuid) -> Result<Vec<WebhookEndpoint>> {
        let rows: Vec<WebhookEndpointRow> = sqlx::query_as(
            "SELECT * FROM webhook_endpoints \
             WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(WebhookEndpointRow::into_endpoint)
            .collect()
    }

    async fn list_subscribed(
        &self,
        user_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookEndpoint>> {
        let rows: Vec<WebhookEndpointRow> = sqlx::query_as(
            r#"
            SELECT * FROM webhook_endpoints
            WHERE user_id = $1
              AND enabled = TRUE
              AND deleted_at IS NULL
              AND $2 = ANY(event_types)
            "#,
        )
        .bind(user_id)
        .bind(event_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(WebhookEndpointRow::into_endpoint)
            .collect()
    }

    async fn soft_delete_endpoint(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE webhook_endpoints \
             SET deleted_at = now(), enabled = FALSE, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_deliveries(&self, deliveries: &[WebhookDelivery]) -> Result<u64> {
        if deliveries.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        for d in deliveries {
            let res = sqlx::query(
                r#"
                INSERT INTO webhook_deliveries (
                    id, endpoint_id, event_id, event_type, payload, status,
                    attempt_count, max_attempts, next_retry_at, last_attempt_at,
                    last_status_code, last_error, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ON CONFLICT (event_id, endpoint_id) DO NOTHING
                "#,
            )
            .bind(d.id)
            .bind(d.endpoint_id)
            .bind(&d.event_id)
            .bind(d.event_type.as_str())
            .bind(&d.payload)
            .bind(d.status.as_str())
            .bind(d.attempt_count)
            .bind(d.max_attempts)
            .bind(d.next_retry_at)
            .bind(d.last_attempt_at)
            .bind(d.last_status_code)
            .bind(&d.last_error)
            .bind(d.created_at)
            .bind(d.updated_at)
            .execute(&self.pool)
            .await?;
            inserted += res.rows_affected();
        }
        Ok(inserted)
    }

    async fn due_deliveries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WebhookDelivery>> {
        let rows: Vec<WebhookDeliveryRow> = sqlx::query_as(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE status IN ('pending', 'failed') AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(WebhookDeliveryRow::into_delivery)
            .collect()
    }

    async fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_deliveries SET
                status = $2,
                attempt_count = $3,
                next_retry_at = $4,
                last_attempt_at = $5,
                last_status_code = $6,
                last_error = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.status.as_str())
        .bind(delivery.attempt_count)
        .bind(delivery.next_retry_at)
        .bind(delivery.last_attempt_at)
        .bind(delivery.last_status_code)
        .bind(&delivery.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn queue_depth(&self) -> Result<i64> {
        let depth: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM webhook_deliveries WHERE status IN ('pending', 'failed')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(depth)
    }
}
