use configs::DatabaseConfig;
use once_cell::sync::Lazy;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::env;

/// `DATABASE_URL` from the environment (or `.env`), if any.
pub static DATABASE_URL: Lazy<Option<String>> = Lazy::new(|| {
    // Load .env if present
    let _ = dotenvy::dotenv();
    env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty())
});

/// Open a pooled connection and verify it answers.
///
/// `connect_timeout` bounds each dial; the caller is expected to wrap the whole
/// call in its own deadline when it needs a hard upper bound.
pub async fn connect_with_config(cfg: &DatabaseConfig) -> anyhow::Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(cfg.url.clone());
    opt.max_connections(cfg.max_connections)
        .min_connections(cfg.min_connections)
        .connect_timeout(cfg.connect_timeout())
        .acquire_timeout(cfg.connect_timeout())
        .sqlx_logging(cfg.sqlx_logging);
    let db = Database::connect(opt).await?;
    db.ping().await?;
    Ok(db)
}
