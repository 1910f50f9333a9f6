// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime contract and registration table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CoreError, Result};
use crate::model::{Function, Run, RunSpec, Runnable, State, StatusPatch, Task, TaskRef};
use crate::store::RunnableStores;

use super::FrameworkRegistry;

/// Handler for one run kind.
///
/// A runtime turns an abstract run into a runnable and locates the runnable
/// again for stop, resume and delete. It never talks to a substrate directly;
/// submission is the framework's job.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run kind handled by this runtime.
    fn kind(&self) -> &str;

    /// Runnable kinds this runtime may produce. Each needs a registered
    /// framework and store.
    fn runnable_kinds(&self) -> Vec<String>;

    /// Resolve a run spec against its upstream definitions.
    fn build(&self, function: &Function, task: &Task, run: &Run) -> Result<RunSpec>;

    /// Produce the runnable for a built run, in READY.
    async fn run(&self, run: &Run) -> Result<Runnable>;

    /// Locate the run's runnable and mark it STOP.
    async fn stop(&self, run: &Run) -> Result<Runnable>;

    /// Locate the run's runnable and mark it RESUME.
    async fn resume(&self, run: &Run) -> Result<Runnable>;

    /// Locate the run's runnable and mark it DELETING.
    ///
    /// `Ok(None)` means there is nothing on the substrate to tear down.
    async fn delete(&self, run: &Run) -> Result<Option<Runnable>>;

    /// Called when the run starts or keeps executing.
    async fn on_running(&self, _run: &Run, _runnable: &Runnable) -> Result<Option<StatusPatch>> {
        Ok(None)
    }

    /// Called when the run completes. Copies substrate results by default.
    async fn on_complete(&self, _run: &Run, runnable: &Runnable) -> Result<Option<StatusPatch>> {
        Ok(Some(StatusPatch {
            message: runnable.message.clone(),
            results: runnable.results.clone(),
        }))
    }

    /// Called when the run fails. Copies the substrate message by default.
    async fn on_error(&self, _run: &Run, runnable: &Runnable) -> Result<Option<StatusPatch>> {
        Ok(Some(StatusPatch {
            message: runnable.message.clone(),
            results: runnable.results.clone(),
        }))
    }
}

/// Check that the run kind matches the runtime handling it.
pub fn ensure_kind(runtime: &dyn Runtime, run: &Run) -> Result<()> {
    if run.kind != runtime.kind() {
        return Err(CoreError::KindMismatch {
            expected: runtime.kind().to_string(),
            actual: run.kind.clone(),
        });
    }
    Ok(())
}

/// Find the runnable produced for `run` across every store.
///
/// Matches on the run ID and the qualified task kind of `run.spec.task`.
pub async fn locate_runnable(stores: &RunnableStores, run: &Run) -> Result<Runnable> {
    let task: TaskRef = run.spec.task.parse()?;
    let qualified = task.qualified_kind();
    stores.locate(&run.id, |r| r.task == qualified).await
}

/// Locate the run's runnable and move it to `state`.
pub async fn mark_runnable(stores: &RunnableStores, run: &Run, state: State) -> Result<Runnable> {
    let mut runnable = locate_runnable(stores, run).await?;
    runnable.set_state(state);
    Ok(runnable)
}

/// Registration table of runtimes, keyed by run kind.
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: HashMap<String, Arc<dyn Runtime>>,
}

impl RuntimeRegistry {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runtime. Fails if its kind is already taken.
    pub fn register(&mut self, runtime: Arc<dyn Runtime>) -> Result<()> {
        let kind = runtime.kind().to_string();
        if self.runtimes.contains_key(&kind) {
            return Err(CoreError::Registration(format!(
                "runtime '{}' registered twice",
                kind
            )));
        }
        self.runtimes.insert(kind, runtime);
        Ok(())
    }

    /// Runtime for `kind`.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn Runtime>> {
        self.runtimes
            .get(kind)
            .cloned()
            .ok_or_else(|| CoreError::UnknownRuntime(kind.to_string()))
    }

    /// Whether a runtime is registered for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.runtimes.contains_key(kind)
    }

    /// Registered run kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.runtimes.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Check that every runnable kind a runtime may produce has a framework
    /// and a store.
    pub fn validate(&self, frameworks: &FrameworkRegistry, stores: &RunnableStores) -> Result<()> {
        for kind in self.kinds() {
            let runtime = self.get(&kind)?;
            for runnable_kind in runtime.runnable_kinds() {
                if !frameworks.contains(&runnable_kind) {
                    return Err(CoreError::Registration(format!(
                        "runtime '{}' produces '{}' runnables but no framework handles them",
                        kind, runnable_kind
                    )));
                }
                if !stores.contains(&runnable_kind) {
                    return Err(CoreError::Registration(format!(
                        "runtime '{}' produces '{}' runnables but no store holds them",
                        kind, runnable_kind
                    )));
                }
            }
        }
        Ok(())
    }
}
