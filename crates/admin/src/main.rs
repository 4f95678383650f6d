mod config;
mod schemas;

use std::sync::Arc;

use content_store_core::events::EventBus;
use content_store_core::lifecycle::{self, LifecycleContext, SchemaRegistry};
use content_store_core::storage::{CollectionQueries, DocumentQueries};
use content_store_postgres::{PgStore, MIGRATOR};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience)
    let _ = dotenvy::dotenv();

    let config = config::AdminConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting content store admin");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {e}"))?;

    tracing::info!("Connected to PostgreSQL");

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;

    tracing::info!("Database migrations applied");

    let store = PgStore::new(pool);
    store
        .health_check()
        .await
        .map_err(|e| anyhow::anyhow!("Database health check failed: {e}"))?;

    let registry = match &config.schema_dir {
        Some(dir) => schemas::load_registry(dir)?,
        None => SchemaRegistry::new(),
    };
    tracing::info!(collections = registry.len(), "Collection schemas loaded");

    let ctx = LifecycleContext::new(registry, Arc::new(store.clone()))
        .with_locales(config.locales.clone())
        .with_events(EventBus::new(config.event_bus_capacity));

    for record in lifecycle::sync_collections(&ctx).await? {
        tracing::info!(collection = %record.path, id = %record.id, "Collection created");
    }

    for record in store.all_collections().await? {
        if ctx.registry.get(&record.path).is_some() {
            let counts = lifecycle::status_counts(&ctx, &record.path).await?;
            tracing::info!(collection = %record.path, counts = ?counts, "Collection status");
        } else {
            let counts = store.document_counts_by_status(record.id).await?;
            tracing::warn!(
                collection = %record.path,
                counts = ?counts,
                "Stored collection has no registered schema"
            );
        }
    }

    Ok(())
}
