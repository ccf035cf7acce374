//! Database module

#[cfg(test)]
pub mod memory;
pub mod queries;
pub mod store;

pub use store::{DistanceCacheStore, PgStore, PlanningStore};

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// How long a query waits for a free connection before failing
pub const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Apply the migrations compiled into the binary
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_embedded_migrations_are_ordered_up_migrations() {
        let migrator = sqlx::migrate!("./migrations");
        let versions: Vec<i64> = migrator.iter().map(|m| m.version).collect();

        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert!(migrator.iter().all(|m| !m.migration_type.is_down_migration()));
    }
}
