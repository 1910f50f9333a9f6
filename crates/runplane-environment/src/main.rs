// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runplane Environment - Run Lifecycle Service
//!
//! Runs the engine with:
//! - the container runtime (`job`, `deploy`, `serve` tasks)
//! - process frameworks executing runnables locally or through a container CLI
//! - SQLite or in-memory runnable stores
//! - the event processor and the monitor

use std::sync::Arc;

use tracing::{info, warn};

use runplane_core::dispatch::Framework;
use runplane_core::repository::InMemoryDefinitionRepository;
use runplane_core::store::{
    InMemoryRunnableStore, RunnableStore, SqliteRunRepository, SqliteRunnableStore, connect_sqlite,
};
use runplane_environment::config::Config;
use runplane_environment::frameworks::{ProcessFramework, ProcessFrameworkConfig};
use runplane_environment::manifest::Manifest;
use runplane_environment::runtime::EngineRuntime;
use runplane_environment::runtimes::ContainerTask;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runplane_environment=info,runplane_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        data_dir = %config.data_dir.display(),
        database = config.database_url.is_some(),
        container_cli = ?config.container_cli,
        "Starting Runplane Environment"
    );

    let pool = match &config.database_url {
        Some(url) => {
            let pool = connect_sqlite(url).await?;
            info!("Connected to database");
            Some(pool)
        }
        None => {
            warn!("RUNPLANE_DATABASE_URL not set, runs and runnables are kept in memory");
            None
        }
    };

    let process_config = ProcessFrameworkConfig {
        data_dir: config.data_dir.clone(),
        container_cli: config.container_cli.clone(),
    };
    let definitions = Arc::new(InMemoryDefinitionRepository::new());

    let mut builder = EngineRuntime::builder()
        .container_runtime()
        .definitions(definitions.clone())
        .monitor_interval(config.monitor_interval)
        .substrate_timeout(config.substrate_timeout)
        .stale_after(config.monitor_stale_after);
    if let Some(pool) = &pool {
        builder = builder.runs(Arc::new(SqliteRunRepository::new(pool.clone())));
    }

    for task in ContainerTask::ALL {
        let kind = task.runnable_kind();
        let store: Arc<dyn RunnableStore> = match &pool {
            Some(pool) => Arc::new(SqliteRunnableStore::new(pool.clone(), kind)),
            None => Arc::new(InMemoryRunnableStore::new(kind)),
        };
        let framework: Arc<dyn Framework> =
            Arc::new(ProcessFramework::new(kind, process_config.clone()));
        builder = builder.store(store).framework(framework);
    }

    let runtime = builder.build()?.start().await?;

    if let Some(path) = &config.manifest {
        let manifest = Manifest::load(path).await?;
        let runs = manifest.submit(runtime.manager(), &definitions).await?;
        info!(path = %path.display(), runs = runs.len(), "Manifest submitted");
    }

    info!("Runplane Environment ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Runplane Environment shut down");

    Ok(())
}
