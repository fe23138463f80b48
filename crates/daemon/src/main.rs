//! Stepwise - Main Entry Point
//! Runs the queue runner over a file or SQLite snapshot until Ctrl+C

mod config;
mod demo_tasks;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{DaemonConfig, StoreConfig};
use stepwise_core::application::{Runner, RunnerConfig, TaskRegistry};
use stepwise_core::port::{NeverReverse, RandomReversal, ReversalPolicy, SnapshotStore, UuidProvider};
use stepwise_infra_file::JsonFileSnapshotStore;
use stepwise_infra_sqlite::{create_pool, run_migrations, SqliteSnapshotStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("STEPWISE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("stepwise=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Stepwise v{} starting...", VERSION);

    // 2. Load configuration
    let config = DaemonConfig::from_env().context("Invalid configuration")?;
    info!(config = ?config, "Configuration loaded");

    // 3. Snapshot store
    let store = build_store(&config.store).await?;

    // 4. Registry + runner wiring
    let mut registry = TaskRegistry::new();
    demo_tasks::register_demo(&mut registry, &config.marker_dir)
        .context("Demo registration failed")?;

    let reversal: Arc<dyn ReversalPolicy> = if config.reversal_probability > 0.0 {
        Arc::new(RandomReversal::new(config.reversal_probability)?)
    } else {
        Arc::new(NeverReverse)
    };

    let runner = Arc::new(Runner::new(
        Arc::new(registry),
        store.clone(),
        reversal,
        Arc::new(UuidProvider),
        RunnerConfig {
            tick_interval: config.tick_interval,
            step_timeout: config.step_timeout,
        },
    ));

    // 5. Seed demo queues on a fresh snapshot
    match store.load_snapshot().await {
        Ok(existing) if existing.is_empty() => {
            for (definition_id, context) in demo_tasks::demo_admissions() {
                runner.admit(definition_id, context).await?;
            }
        }
        Ok(existing) => info!(instances = existing.len(), "Resuming persisted queues"),
        Err(e) => warn!(error = %e, "Snapshot unreadable, not seeding demo queues"),
    }

    // 6. Start ticking
    let handle = runner.start();
    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Finishing current tick...");

    if let Err(e) = handle.stop_and_wait().await {
        error!(error = %e, "Runner did not stop cleanly");
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn build_store(config: &StoreConfig) -> Result<Arc<dyn SnapshotStore>> {
    match config {
        StoreConfig::File { path } => {
            info!(path = %path.display(), "Using JSON file snapshot");
            Ok(Arc::new(JsonFileSnapshotStore::new(path)))
        }
        StoreConfig::Sqlite { db_path } => {
            info!(db_path = %db_path, "Initializing database...");
            if let Some(parent) = std::path::Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("cannot create {}", parent.display()))?;
                }
            }
            let pool = create_pool(&format!("sqlite://{}", db_path))
                .await
                .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
            run_migrations(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
            Ok(Arc::new(SqliteSnapshotStore::new(pool)))
        }
    }
}
