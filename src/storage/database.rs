// Postgres connection pool management

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

use crate::config::{redact_url, DatabaseConfig};
use crate::domain::{PenshortError, Result};

/// Pool wrapper owning the database handle for the whole service
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect and optionally run embedded migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(url = %redact_url(&config.url), "connecting to postgres");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await?;

        let db = Self { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        info!("postgres pool ready");
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("running migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PenshortError::internal(format!("migration failed: {}", e)))?;
        info!("migrations complete");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Session-scoped advisory lock, used by integration tests to serialize
    /// access to shared fixtures
    pub async fn advisory_lock(&self, key: i64) -> Result<()> {
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn advisory_unlock(&self, key: i64) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
