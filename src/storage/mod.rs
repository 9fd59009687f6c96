//! Durable persistence: pool management, row models, repositories

pub mod database;
pub mod models;
pub mod repository;

pub use database::Database;
pub use repository::{
    ApiKeyRepository, ClickEventRepository, LinkRepository, Page, PgApiKeyRepository,
    PgClickEventRepository, PgLinkRepository, PgStatsRepository, PgUserRepository,
    PgWebhookRepository, StatsRepository, UserRepository, WebhookRepository,
};
