use std::time::Duration;

use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use crate::config::Config;

pub type Db = MySqlPool;

/// Open the pool, retrying while the database container is still starting.
pub async fn connect(config: &Config) -> anyhow::Result<Db> {
    let url      = config.database_url();
    let attempts = config.db_connect_retries.max(1);
    let delay    = Duration::from_secs(config.db_connect_retry_secs);

    let mut attempt = 1;
    loop {
        match MySqlPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
        {
            Ok(pool) => {
                tracing::info!(attempt, "Database connection pool established");
                return Ok(pool);
            }
            Err(err) if attempt < attempts => {
                tracing::warn!(attempt, attempts, error = %err, "Database not ready, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "Could not connect to the database after {attempts} attempts: {err}"
                ));
            }
        }
    }
}

/// Run all SQLx migrations from the `migrations/` directory embedded at compile time.
pub async fn run_migrations(pool: &Db) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
