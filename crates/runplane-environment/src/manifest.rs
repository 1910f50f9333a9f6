// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON manifest of functions, tasks and runs submitted at start.
//!
//! ```json
//! {
//!   "functions": [{"id": "f1", "project": "demo", "name": "hello", "kind": "container",
//!                  "spec": {"command": "echo", "args": ["hello"]}}],
//!   "tasks": [{"id": "t1", "project": "demo", "kind": "container+job"}],
//!   "runs": [{"project": "demo", "kind": "container",
//!             "spec": {"task": "container+job://demo/hello"}}]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use runplane_core::lifecycle::RunLifecycleManager;
use runplane_core::model::{Function, Run, RunSpec, Task};
use runplane_core::repository::InMemoryDefinitionRepository;

use crate::error::{Error, Result};

/// Run entry of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRun {
    /// Fixed run ID; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning project.
    pub project: String,
    /// Run kind.
    pub kind: String,
    /// Acting user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Run specification.
    pub spec: RunSpec,
}

impl ManifestRun {
    fn to_run(&self) -> Run {
        let mut run = Run::new(&self.project, &self.kind, self.spec.clone());
        if let Some(id) = &self.id {
            run = run.with_id(id);
        }
        if let Some(user) = &self.user {
            run = run.with_user(user);
        }
        run
    }
}

/// Definitions and runs to submit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Functions to register.
    #[serde(default)]
    pub functions: Vec<Function>,
    /// Tasks to register.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Runs to create, build and run.
    #[serde(default)]
    pub runs: Vec<ManifestRun>,
}

impl Manifest {
    /// Load and validate a manifest file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let manifest: Manifest = serde_json::from_str(&content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check that run IDs are unique and every run names a task.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for run in &self.runs {
            if run.spec.task.trim().is_empty() {
                return Err(Error::Manifest(format!(
                    "run of kind '{}' in project '{}' has no task reference",
                    run.kind, run.project
                )));
            }
            if let Some(id) = &run.id
                && !ids.insert(id.as_str())
            {
                return Err(Error::Manifest(format!("duplicate run id '{}'", id)));
            }
        }
        Ok(())
    }

    /// Register the definitions, then create, build and run every run.
    pub async fn submit(
        &self,
        manager: &RunLifecycleManager,
        definitions: &InMemoryDefinitionRepository,
    ) -> Result<Vec<Run>> {
        for function in &self.functions {
            definitions.put_function(function.clone()).await;
        }
        for task in &self.tasks {
            definitions.put_task(task.clone()).await;
        }

        let mut submitted = Vec::with_capacity(self.runs.len());
        for entry in &self.runs {
            let run = manager.create(entry.to_run()).await?;
            manager.build(&run.id).await?;
            let run = manager.run(&run.id).await?;
            info!(
                run_id = %run.id,
                task = %run.spec.task,
                state = %run.state(),
                "Manifest run submitted"
            );
            submitted.push(run);
        }
        Ok(submitted)
    }
}
