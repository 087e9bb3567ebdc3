use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

/// Postgres pool backing [`crate::store::PgStore`].
#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    /// Connects when `DATABASE_URL` is configured, `None` otherwise.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Option<Self>, sqlx::Error> {
        let Some(url) = config.url.as_deref() else {
            return Ok(None);
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        info!(pool_size = config.pool_size, "Postgres pool ready");

        Ok(Some(Database { pool }))
    }

    /// Applies the order schema migrations under `src/migrations`.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Applying order schema migrations");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Order schema is up to date");
        Ok(())
    }
}
