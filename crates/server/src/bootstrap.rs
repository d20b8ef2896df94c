use std::sync::Arc;

use claimlens_analytics::{AnalyticsRepositories, AnalyticsService, ChangeFeed, InsightCache};
use claimlens_core::config::{AppConfig, ConfigError};
use claimlens_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: AnalyticsService,
    pub change_feed: ChangeFeed,
    pub cache_listener: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let change_feed = ChangeFeed::default();
    let cache = Arc::new(InsightCache::new());
    let cache_listener = cache.listen(&change_feed);
    let service =
        AnalyticsService::new(AnalyticsRepositories::sql(db_pool.clone()), config.analytics.clone())
            .with_insight_cache(cache);
    info!(
        event_name = "system.bootstrap.analytics_ready",
        correlation_id = "bootstrap",
        repeat_window = ?config.analytics.repeat_window,
        trend_months = config.analytics.trend_months,
        "analytics service wired"
    );

    Ok(Application { config, db_pool, service, change_feed, cache_listener })
}
