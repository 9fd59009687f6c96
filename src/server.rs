//! Startup wiring and graceful shutdown
//!
//! Boot order: config, observability, pools, services, workers, listener.
//! Shutdown runs the same list backwards: stop accepting, drain HTTP up to
//! the deadline, cancel workers in reverse registration order, close pools.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analytics::{
    AnalyticsPublisher, ClickConsumer, ClickFlusher, ClickRecorder, ConsumerConfig,
};
use crate::api::{create_router, AppState};
use crate::auth::AuthService;
use crate::cache::{ClickStream, LinkCache, RedisCache, TokenBucket};
use crate::config::Config;
use crate::domain::Result;
use crate::links::{LinkService, RedirectResolver};
use crate::observability;
use crate::ratelimit::RateLimiter;
use crate::storage::{
    Database, PgApiKeyRepository, PgClickEventRepository, PgLinkRepository, PgStatsRepository,
    PgUserRepository, PgWebhookRepository,
};
use crate::webhooks::{WebhookOutbox, WebhookWorker};

/// A registered background worker: name plus its join handle
struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    token: CancellationToken,
}

pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    observability::init_tracing(&config.logging);

    let metrics_handle = match observability::install_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable, continuing without");
            None
        }
    };

    info!(env = %config.app.env, port = config.app.port, "starting penshort");

    let database = Database::connect(&config.database).await?;
    let cache = RedisCache::connect(&config.redis).await?;

    // Repositories
    let pool = database.pool().clone();
    let links_repo = Arc::new(PgLinkRepository::new(pool.clone()));
    let users_repo = Arc::new(PgUserRepository::new(pool.clone()));
    let api_keys_repo = Arc::new(PgApiKeyRepository::new(pool.clone()));
    let clicks_repo = Arc::new(PgClickEventRepository::new(pool.clone()));
    let stats_repo = Arc::new(PgStatsRepository::new(pool.clone()));
    let webhooks_repo = Arc::new(PgWebhookRepository::new(pool));

    // Cache-facing collaborators
    let link_cache = LinkCache::new(cache.clone());
    let stream = ClickStream::new(cache.clone());
    let bucket = TokenBucket::new(cache.clone());

    // Services
    let link_service = LinkService::new(links_repo.clone(), link_cache.clone());
    let resolver = RedirectResolver::new(links_repo.clone(), link_cache.clone());
    let publisher = AnalyticsPublisher::new(stream.clone());
    let outbox = WebhookOutbox::new(webhooks_repo.clone());
    let recorder = ClickRecorder::new(
        link_cache.clone(),
        publisher,
        outbox,
        links_repo.clone(),
    );
    let auth = AuthService::new(api_keys_repo.clone(), cache.clone());
    let limiter = RateLimiter::new(bucket, config.rate_limit.clone());

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        links: link_service,
        resolver,
        recorder,
        auth,
        limiter,
        api_keys: api_keys_repo,
        users: users_repo,
        webhooks: webhooks_repo.clone(),
        stats: stats_repo.clone(),
        database: database.clone(),
        cache: cache.clone(),
        metrics: metrics_handle,
    };

    // Workers, registered in boot order and drained in reverse
    let mut workers: Vec<Worker> = Vec::new();

    {
        let token = CancellationToken::new();
        let consumer = ClickConsumer::new(
            stream.clone(),
            clicks_repo,
            stats_repo,
            ConsumerConfig::default(),
        );
        let worker_token = token.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = consumer.run(worker_token).await {
                error!(error = %e, "analytics consumer exited with error");
            }
        });
        workers.push(Worker {
            name: "analytics-consumer",
            handle,
            token,
        });
    }

    {
        let token = CancellationToken::new();
        let worker = WebhookWorker::new(webhooks_repo, config.webhook.clone())?;
        let worker_token = token.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = worker.run(worker_token).await {
                error!(error = %e, "webhook worker exited with error");
            }
        });
        workers.push(Worker {
            name: "webhook-worker",
            handle,
            token,
        });
    }

    {
        let token = CancellationToken::new();
        let flusher = ClickFlusher::new(link_cache, links_repo);
        let worker_token = token.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = flusher.run(worker_token).await {
                error!(error = %e, "click flusher exited with error");
            }
        });
        workers.push(Worker {
            name: "click-flusher",
            handle,
            token,
        });
    }

    // HTTP listener
    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        crate::domain::PenshortError::internal(format!("bind {} failed: {}", addr, e))
    })?;
    info!(addr = %addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| crate::domain::PenshortError::internal(format!("server error: {}", e)))?;

    info!("http drained, stopping workers");

    // Reverse registration order, each bounded by the shutdown deadline
    for worker in workers.into_iter().rev() {
        worker.token.cancel();
        match tokio::time::timeout(config.app.shutdown_timeout, worker.handle).await {
            Ok(Ok(())) => info!(worker = worker.name, "worker stopped"),
            Ok(Err(e)) => error!(worker = worker.name, error = %e, "worker panicked"),
            Err(_) => warn!(worker = worker.name, "worker missed the shutdown deadline"),
        }
    }

    database.close().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("ctrl-c handler installs");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("sigterm handler installs")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
