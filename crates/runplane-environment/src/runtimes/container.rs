// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime.
//!
//! Interprets runs of kind `container`. The task kind picks the runnable
//! kind, and with it the framework and store:
//!
//! | Task | Runnable kind |
//! |------|---------------|
//! | `job` | `job` |
//! | `deploy` | `deployment` |
//! | `serve` | `service` |

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::debug;

use runplane_core::dispatch::{Runtime, ensure_kind, mark_runnable};
use runplane_core::error::{CoreError, Result};
use runplane_core::model::{Function, Run, RunSpec, Runnable, State, Task, TaskRef};
use runplane_core::store::RunnableStores;

/// Run kind handled by [`ContainerRuntime`].
pub const CONTAINER_KIND: &str = "container";

/// Task kinds supported by the container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerTask {
    /// Run to completion.
    Job,
    /// Long-running workload.
    Deploy,
    /// Long-running workload exposed as a service.
    Serve,
}

impl ContainerTask {
    /// All task kinds.
    pub const ALL: [ContainerTask; 3] = [
        ContainerTask::Job,
        ContainerTask::Deploy,
        ContainerTask::Serve,
    ];

    /// Task kind name as written in task references.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerTask::Job => "job",
            ContainerTask::Deploy => "deploy",
            ContainerTask::Serve => "serve",
        }
    }

    /// Runnable kind produced for this task.
    pub fn runnable_kind(&self) -> &'static str {
        match self {
            ContainerTask::Job => "job",
            ContainerTask::Deploy => "deployment",
            ContainerTask::Serve => "service",
        }
    }
}

impl fmt::Display for ContainerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerTask {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        ContainerTask::ALL
            .into_iter()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| CoreError::UnsupportedTaskKind {
                runtime: CONTAINER_KIND.to_string(),
                task_kind: s.to_string(),
            })
    }
}

/// Runtime producing container runnables.
pub struct ContainerRuntime {
    stores: RunnableStores,
}

impl ContainerRuntime {
    /// Create a runtime locating runnables in `stores`.
    pub fn new(stores: RunnableStores) -> Self {
        Self { stores }
    }

    fn task_of(&self, run: &Run) -> Result<(TaskRef, ContainerTask)> {
        let reference: TaskRef = run.spec.task.parse()?;
        if reference.runtime != CONTAINER_KIND {
            return Err(CoreError::KindMismatch {
                expected: CONTAINER_KIND.to_string(),
                actual: reference.runtime,
            });
        }
        let task = reference.task_kind.parse()?;
        Ok((reference, task))
    }
}

#[async_trait]
impl Runtime for ContainerRuntime {
    fn kind(&self) -> &str {
        CONTAINER_KIND
    }

    fn runnable_kinds(&self) -> Vec<String> {
        ContainerTask::ALL
            .iter()
            .map(|task| task.runnable_kind().to_string())
            .collect()
    }

    fn build(&self, function: &Function, task: &Task, run: &Run) -> Result<RunSpec> {
        ensure_kind(self, run)?;
        if function.kind != CONTAINER_KIND {
            return Err(CoreError::KindMismatch {
                expected: CONTAINER_KIND.to_string(),
                actual: function.kind.clone(),
            });
        }
        if let Some((runtime, _)) = task.kind.split_once('+')
            && runtime != CONTAINER_KIND
        {
            return Err(CoreError::KindMismatch {
                expected: CONTAINER_KIND.to_string(),
                actual: runtime.to_string(),
            });
        }
        let (_, requested) = self.task_of(run)?;
        let resolved = task.task_kind().parse::<ContainerTask>()?;
        if resolved != requested {
            return Err(CoreError::KindMismatch {
                expected: requested.to_string(),
                actual: resolved.to_string(),
            });
        }

        let mut spec = run.spec.clone();
        spec.profile.fill_from(&task.spec.profile);
        spec.function = Some(function.spec.clone());

        debug!(run_id = %run.id, task = %task.id, function = %function.name, "Run spec built");
        Ok(spec)
    }

    async fn run(&self, run: &Run) -> Result<Runnable> {
        ensure_kind(self, run)?;
        let (reference, task) = self.task_of(run)?;
        let function = run.spec.function.as_ref().ok_or_else(|| CoreError::InvalidInput {
            event: "RUN".to_string(),
            reason: "run has not been built".to_string(),
        })?;
        if function.image.is_none() && function.command.is_none() {
            return Err(CoreError::InvalidInput {
                event: "RUN".to_string(),
                reason: "function defines neither image nor command".to_string(),
            });
        }

        let profile = &run.spec.profile;
        let mut runnable = Runnable::new(
            &run.id,
            &run.project,
            CONTAINER_KIND,
            reference.qualified_kind(),
            task.runnable_kind(),
        );
        runnable.user.clone_from(&run.user);
        runnable.image.clone_from(&function.image);
        runnable.command.clone_from(&function.command);
        runnable.args = run
            .spec
            .args
            .clone()
            .unwrap_or_else(|| function.args.clone());
        runnable.envs = profile.envs.clone();
        runnable.volumes = profile.volumes.clone();
        runnable.resources = profile.resources.clone();
        runnable.node_selector = profile.node_selector.clone();
        runnable.secrets = profile.secrets.clone();
        runnable.backoff_limit = profile.backoff_limit;
        match task {
            ContainerTask::Job => runnable.schedule.clone_from(&profile.schedule),
            ContainerTask::Deploy | ContainerTask::Serve => {
                runnable.replicas = Some(profile.replicas.unwrap_or(1));
            }
        }

        debug!(
            run_id = %run.id,
            kind = %runnable.kind,
            image = ?runnable.image,
            "Runnable produced"
        );
        Ok(runnable)
    }

    async fn stop(&self, run: &Run) -> Result<Runnable> {
        ensure_kind(self, run)?;
        mark_runnable(&self.stores, run, State::Stop).await
    }

    async fn resume(&self, run: &Run) -> Result<Runnable> {
        ensure_kind(self, run)?;
        mark_runnable(&self.stores, run, State::Resume).await
    }

    async fn delete(&self, run: &Run) -> Result<Option<Runnable>> {
        ensure_kind(self, run)?;
        mark_runnable(&self.stores, run, State::Deleting)
            .await
            .map(Some)
    }
}
