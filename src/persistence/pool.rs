// =============================================================================
// Connection pool construction
// =============================================================================

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use tracing::info;

/// Build the pool from `DATABASE_URL` and run a `SELECT 1` connectivity
/// check before handing it back — fail fast on a bad DSN rather than on
/// the first query of the first tick.
pub async fn connect(database_url: &str) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("database connectivity check failed: {e}"))?;
    info!("startup check: database OK");

    Ok(pool)
}
