// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for runplane-environment.
//!
//! [`EngineRuntime`] wires the registration tables, the lifecycle manager,
//! the event processor and the monitor, and runs the two background tasks
//! inside an existing tokio application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use runplane_core::store::InMemoryRunnableStore;
//! use runplane_environment::frameworks::MockFramework;
//! use runplane_environment::runtime::EngineRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut builder = EngineRuntime::builder().container_runtime();
//!     for kind in ["job", "deployment", "service"] {
//!         builder = builder
//!             .store(Arc::new(InMemoryRunnableStore::new(kind)))
//!             .framework(Arc::new(MockFramework::new(kind)));
//!     }
//!     let runtime = builder.build()?.start().await?;
//!
//!     // ... create and drive runs through runtime.manager() ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use runplane_core::dispatch::{Framework, FrameworkRegistry, Runtime, RuntimeRegistry};
use runplane_core::events::{EventBus, EventReceiver, RunnableListener};
use runplane_core::lifecycle::RunLifecycleManager;
use runplane_core::repository::{DefinitionRepository, InMemoryRunRepository, RunRepository};
use runplane_core::store::{RunnableStore, RunnableStores};

use crate::monitor::{Monitor, MonitorConfig};
use crate::processor::{EventProcessor, EventProcessorConfig};
use crate::runtimes::ContainerRuntime;

type RuntimeFactory = Box<dyn FnOnce(&RunnableStores) -> Arc<dyn Runtime> + Send>;

/// Builder for creating an [`EngineRuntime`].
pub struct EngineRuntimeBuilder {
    stores: Vec<Arc<dyn RunnableStore>>,
    frameworks: Vec<Arc<dyn Framework>>,
    runtimes: Vec<RuntimeFactory>,
    runs: Option<Arc<dyn RunRepository>>,
    definitions: Option<Arc<dyn DefinitionRepository>>,
    listeners: Vec<Arc<dyn RunnableListener>>,
    monitor: MonitorConfig,
    processor: EventProcessorConfig,
}

impl Default for EngineRuntimeBuilder {
    fn default() -> Self {
        Self {
            stores: Vec::new(),
            frameworks: Vec::new(),
            runtimes: Vec::new(),
            runs: None,
            definitions: None,
            listeners: Vec::new(),
            monitor: MonitorConfig::default(),
            processor: EventProcessorConfig::default(),
        }
    }
}

impl EngineRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a runnable store.
    pub fn store(mut self, store: Arc<dyn RunnableStore>) -> Self {
        self.stores.push(store);
        self
    }

    /// Add several runnable stores.
    pub fn stores(mut self, stores: impl IntoIterator<Item = Arc<dyn RunnableStore>>) -> Self {
        self.stores.extend(stores);
        self
    }

    /// Add a framework.
    pub fn framework(mut self, framework: Arc<dyn Framework>) -> Self {
        self.frameworks.push(framework);
        self
    }

    /// Add a runtime.
    pub fn runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.runtimes.push(Box::new(move |_| runtime));
        self
    }

    /// Add a runtime constructed from the final store table.
    pub fn runtime_with<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&RunnableStores) -> Arc<dyn Runtime> + Send + 'static,
    {
        self.runtimes.push(Box::new(factory));
        self
    }

    /// Add the [`ContainerRuntime`].
    pub fn container_runtime(self) -> Self {
        self.runtime_with(|stores| Arc::new(ContainerRuntime::new(stores.clone())))
    }

    /// Set the run repository (default: in-memory).
    pub fn runs(mut self, runs: Arc<dyn RunRepository>) -> Self {
        self.runs = Some(runs);
        self
    }

    /// Set the definition repository used to build runs.
    pub fn definitions(mut self, definitions: Arc<dyn DefinitionRepository>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    /// Add a listener for changed runnables.
    pub fn listener(mut self, listener: Arc<dyn RunnableListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Set the monitor poll interval.
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor.poll_interval = interval;
        self
    }

    /// Set the timeout applied to substrate calls, both status reads and
    /// submissions.
    pub fn substrate_timeout(mut self, timeout: Duration) -> Self {
        self.monitor.status_timeout = timeout;
        self.processor.submit_timeout = timeout;
        self
    }

    /// Fail runnables with no terminal phase after `stale_after`.
    pub fn stale_after(mut self, stale_after: Option<Duration>) -> Self {
        self.monitor.stale_after = stale_after;
        self
    }

    /// Set how many times a timed out submission is retried.
    pub fn submit_retries(mut self, retries: u32) -> Self {
        self.processor.submit_retries = retries;
        self
    }

    /// Set how many events the processor handles at the same time.
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.processor.max_concurrency = max;
        self
    }

    /// Set the delay before the first submission retry.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.processor.retry_backoff = backoff;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if a kind is registered twice or a runtime produces
    /// runnables that no framework or store handles.
    pub fn build(self) -> Result<EngineRuntimeConfig> {
        let mut stores = RunnableStores::new();
        for store in self.stores {
            stores.register(store)?;
        }

        let mut frameworks = FrameworkRegistry::new();
        for framework in self.frameworks {
            frameworks.register(framework)?;
        }

        let mut runtimes = RuntimeRegistry::new();
        for factory in self.runtimes {
            runtimes.register(factory(&stores))?;
        }
        if runtimes.kinds().is_empty() {
            anyhow::bail!("at least one runtime is required");
        }

        let runs = self
            .runs
            .unwrap_or_else(|| Arc::new(InMemoryRunRepository::new()));
        let (bus, events) = EventBus::channel();

        let mut manager = RunLifecycleManager::new(runtimes, frameworks, stores, runs, bus)?
            .with_substrate_timeout(self.processor.submit_timeout);
        if let Some(definitions) = self.definitions {
            manager = manager.with_definitions(definitions);
        }

        Ok(EngineRuntimeConfig {
            manager: Arc::new(manager),
            events,
            listeners: self.listeners,
            monitor: self.monitor,
            processor: self.processor,
        })
    }
}

/// Configuration for an [`EngineRuntime`].
///
/// Runs may already be driven through [`manager`](Self::manager); their
/// events wait on the bus until the runtime starts.
pub struct EngineRuntimeConfig {
    manager: Arc<RunLifecycleManager>,
    events: EventReceiver,
    listeners: Vec<Arc<dyn RunnableListener>>,
    monitor: MonitorConfig,
    processor: EventProcessorConfig,
}

impl EngineRuntimeConfig {
    /// Lifecycle manager of the runtime to be started.
    pub fn manager(&self) -> &Arc<RunLifecycleManager> {
        &self.manager
    }

    /// Start the runtime, spawning the event processor and monitor tasks.
    pub async fn start(self) -> Result<EngineRuntime> {
        let manager = self.manager;

        let processor = Arc::new(EventProcessor::new(
            manager.clone(),
            self.listeners,
            self.processor,
        ));
        let processor_shutdown = processor.shutdown_handle();
        let events = self.events;
        let processor_handle = tokio::spawn(async move {
            processor.run(events).await;
        });

        let monitor = Monitor::new(
            manager.stores().clone(),
            manager.frameworks().clone(),
            manager.bus().clone(),
            self.monitor,
        );
        let monitor_shutdown = monitor.shutdown_handle();
        let monitor_handle = tokio::spawn(async move {
            monitor.run().await;
        });

        info!(runtimes = ?manager.runtimes().kinds(), "EngineRuntime started");

        Ok(EngineRuntime {
            manager,
            processor_handle,
            processor_shutdown,
            monitor_handle,
            monitor_shutdown,
        })
    }
}

/// Running engine.
pub struct EngineRuntime {
    manager: Arc<RunLifecycleManager>,
    processor_handle: JoinHandle<()>,
    processor_shutdown: Arc<Notify>,
    monitor_handle: JoinHandle<()>,
    monitor_shutdown: Arc<Notify>,
}

impl EngineRuntime {
    /// Create a new builder.
    pub fn builder() -> EngineRuntimeBuilder {
        EngineRuntimeBuilder::new()
    }

    /// Lifecycle manager driving runs.
    pub fn manager(&self) -> &Arc<RunLifecycleManager> {
        &self.manager
    }

    /// Signal shutdown and wait for the background tasks to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("EngineRuntime shutting down...");

        self.monitor_shutdown.notify_one();
        self.processor_shutdown.notify_one();

        if let Err(e) = self.monitor_handle.await {
            error!("Monitor task panicked: {}", e);
        }
        if let Err(e) = self.processor_handle.await {
            error!("Event processor task panicked: {}", e);
        }

        info!("EngineRuntime shutdown complete");
        Ok(())
    }

    /// Whether both background tasks are still running.
    pub fn is_running(&self) -> bool {
        !self.processor_handle.is_finished() && !self.monitor_handle.is_finished()
    }
}
