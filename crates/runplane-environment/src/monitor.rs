// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker reconciling running runnables with their substrate.
//!
//! Every pass walks all runnable stores, asks the framework of each RUNNING
//! runnable for its substrate status and applies the mapped state:
//!
//! - `Succeeded` moves the runnable to COMPLETED
//! - `Failed` or `Error` moves it to ERROR, keeping the substrate message
//! - a missing or unreadable substrate object moves it to ERROR
//! - a status call that times out is skipped until the next pass
//!
//! Changed runnables are stored and published as "changed", which lets the
//! lifecycle manager move the owning run. Entries are never removed here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use runplane_core::dispatch::{FrameworkRegistry, SubstrateStatus};
use runplane_core::error::{CoreError, Result};
use runplane_core::events::EventBus;
use runplane_core::model::{Runnable, State};
use runplane_core::store::{RunnableStore, RunnableStores};

/// Configuration for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often to reconcile.
    pub poll_interval: Duration,
    /// Timeout for a single status call.
    pub status_timeout: Duration,
    /// Fail runnables whose substrate reports no terminal phase for longer
    /// than this since their last update. `None` polls forever.
    pub stale_after: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            status_timeout: Duration::from_secs(30),
            stale_after: None,
        }
    }
}

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    /// RUNNING runnables inspected.
    pub checked: usize,
    /// Runnables whose state changed.
    pub changed: usize,
    /// Runnables skipped because of a retryable error.
    pub skipped: usize,
    /// Runnables that could not be reconciled or stored.
    pub failed: usize,
}

enum Reconciled {
    Unchanged,
    Changed(Runnable),
    Skipped,
}

/// Periodic reconciliation loop.
pub struct Monitor {
    stores: RunnableStores,
    frameworks: FrameworkRegistry,
    bus: EventBus,
    config: MonitorConfig,
    shutdown: Arc<Notify>,
}

impl Monitor {
    /// Create a new monitor.
    pub fn new(
        stores: RunnableStores,
        frameworks: FrameworkRegistry,
        bus: EventBus,
        config: MonitorConfig,
    ) -> Self {
        Self {
            stores,
            frameworks,
            bus,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the monitor loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            status_timeout_secs = self.config.status_timeout.as_secs(),
            stale_after_secs = ?self.config.stale_after.map(|d| d.as_secs()),
            "Monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Monitor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.monitor().await;
                }
            }
        }

        info!("Monitor stopped");
    }

    /// Run a single reconciliation pass.
    pub async fn monitor(&self) -> MonitorReport {
        let mut report = MonitorReport::default();

        for store in self.stores.iter() {
            let runnables = match store.find_all().await {
                Ok(runnables) => runnables,
                Err(e) => {
                    error!(kind = %store.kind(), error = %e, "Failed to list runnables");
                    report.failed += 1;
                    continue;
                }
            };

            for runnable in runnables.into_iter().filter(|r| r.state == State::Running) {
                report.checked += 1;
                let id = runnable.id.clone();
                match self.reconcile(store.as_ref(), runnable).await {
                    Ok(Reconciled::Unchanged) => {}
                    Ok(Reconciled::Skipped) => report.skipped += 1,
                    Ok(Reconciled::Changed(runnable)) => {
                        report.changed += 1;
                        self.bus.changed(runnable);
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(runnable_id = %id, error = %e, "Failed to reconcile runnable");
                    }
                }
            }
        }

        if report.checked > 0 {
            debug!(
                checked = report.checked,
                changed = report.changed,
                skipped = report.skipped,
                failed = report.failed,
                "Monitor pass finished"
            );
        }
        report
    }

    async fn reconcile(
        &self,
        store: &dyn RunnableStore,
        mut runnable: Runnable,
    ) -> Result<Reconciled> {
        let status = match self.status(&runnable).await {
            Ok(status) => status,
            Err(e) if e.is_retryable() => {
                warn!(
                    runnable_id = %runnable.id,
                    error = %e,
                    "Status check timed out, retrying next pass"
                );
                return Ok(Reconciled::Skipped);
            }
            Err(e) => {
                warn!(runnable_id = %runnable.id, error = %e, "Substrate object unreadable");
                runnable.fail(format!("substrate status unavailable: {}", e));
                store.store(&runnable.id, &runnable).await?;
                return Ok(Reconciled::Changed(runnable));
            }
        };

        match status.state() {
            Some(state) => {
                info!(
                    runnable_id = %runnable.id,
                    phase = %status.phase,
                    state = %state,
                    "Runnable reached a terminal phase"
                );
                if status.message.is_some() {
                    runnable.message = status.message;
                }
                runnable.results.extend(status.results);
                runnable.set_state(state);
            }
            None if self.is_stale(&runnable) => {
                warn!(runnable_id = %runnable.id, phase = %status.phase, "Runnable is stale");
                runnable.fail(format!(
                    "no terminal phase reported since {} (last phase: {})",
                    runnable.updated_at.to_rfc3339(),
                    status.phase
                ));
            }
            None => {
                debug!(
                    runnable_id = %runnable.id,
                    phase = %status.phase,
                    "Runnable still in progress"
                );
                return Ok(Reconciled::Unchanged);
            }
        }

        store.store(&runnable.id, &runnable).await?;
        Ok(Reconciled::Changed(runnable))
    }

    async fn status(&self, runnable: &Runnable) -> Result<SubstrateStatus> {
        let framework = self.frameworks.get(&runnable.kind)?;
        tokio::time::timeout(self.config.status_timeout, framework.status(runnable))
            .await
            .map_err(|_| CoreError::Timeout {
                operation: format!("status of {}", runnable.id),
                timeout: self.config.status_timeout,
            })?
    }

    fn is_stale(&self, runnable: &Runnable) -> bool {
        let Some(stale_after) = self.config.stale_after else {
            return false;
        };
        let Ok(stale_after) = chrono::Duration::from_std(stale_after) else {
            return false;
        };
        Utc::now() - runnable.updated_at > stale_after
    }
}
