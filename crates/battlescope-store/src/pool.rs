//! Connection helper. `PgPoolOptions` tuning mirrors what a single-process
//! ingestion/clustering service needs: a handful of connections for the
//! ticker loops plus headroom for read queries, not a web server's pool.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}
