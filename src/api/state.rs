// Shared application state handed to every handler

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::analytics::ClickRecorder;
use crate::auth::AuthService;
use crate::cache::RedisCache;
use crate::config::Config;
use crate::links::{LinkService, RedirectResolver};
use crate::ratelimit::RateLimiter;
use crate::storage::{ApiKeyRepository, Database, StatsRepository, UserRepository, WebhookRepository};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub links: LinkService,
    pub resolver: RedirectResolver,
    pub recorder: ClickRecorder,
    pub auth: AuthService,
    pub limiter: RateLimiter,

    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub users: Arc<dyn UserRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub stats: Arc<dyn StatsRepository>,

    pub database: Database,
    pub cache: RedisCache,

    /// Prometheus exposition; `None` when metrics are disabled (tests)
    pub metrics: Option<PrometheusHandle>,
}
