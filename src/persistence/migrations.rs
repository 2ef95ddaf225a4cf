// =============================================================================
// Schema migrations
// =============================================================================
//
// The migration runner itself is an external-collaborator concern (spec's
// out-of-scope migration-runner UX); this workspace only needs the schema
// applied before the two binaries start. `sqlx::migrate!` embeds the SQL
// files under `migrations/` at compile time and tracks applied versions in
// its own bookkeeping table — no hand-rolled comment-stripping SQL parser.

use sqlx::MySqlPool;
use tracing::info;

pub async fn run(pool: &MySqlPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("schema migrations applied");
    Ok(())
}
