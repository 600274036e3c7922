use sqlx::PgPool;

use super::config::DatabaseConfig;

/// PostgreSQL 接続プールを作成する。
pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(cfg.max_open_conns)
        .connect(&cfg.connection_url())
        .await?;
    tracing::info!(host = %cfg.host, database = %cfg.name, "connected to database");
    Ok(pool)
}
