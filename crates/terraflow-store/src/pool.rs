//! Connection pool construction, matching the teacher's
//! `SystemContext::with_pool`/`sqlx::PgPool` bootstrap pattern. §5's
//! "Shared-resource policy" caps pool size — no long-held per-worker pools
//! that persist independently of this singleton.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::StoreResult;

pub async fn connect(connection_string: &str, max_connections: u32) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(connection_string)
        .await?;
    Ok(pool)
}

/// Embedded migration set for `app.jobs`/`app.tasks` plus the three atomic
/// procedures. Referenced the way the teacher's integration tests reference
/// `tasker_shared::database::migrator::MIGRATOR`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
