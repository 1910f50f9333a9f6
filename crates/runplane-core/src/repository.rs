// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Collaborator contracts consumed by the engine, with in-memory
//! implementations.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::model::{Function, Run, Task, TaskRef};

/// Persistence for runs.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Load a run, [`CoreError::NotFound`] when absent.
    async fn find(&self, id: &str) -> Result<Run>;

    /// Insert or replace a run.
    async fn save(&self, run: &Run) -> Result<()>;

    /// Every run of `project`.
    async fn list(&self, project: &str) -> Result<Vec<Run>>;
}

/// Read-only access to functions and tasks.
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// Function by project and name.
    async fn find_function(&self, project: &str, name: &str) -> Result<Function>;

    /// Task by ID.
    async fn find_task(&self, id: &str) -> Result<Task>;

    /// Task of `kind` bound to the function `function` of `project`.
    async fn find_task_for_function(
        &self,
        project: &str,
        function: &str,
        kind: &str,
    ) -> Result<Task>;

    /// Resolve the function and task a reference points at.
    async fn resolve(&self, reference: &TaskRef) -> Result<(Function, Task)> {
        let function = self
            .find_function(&reference.project, &reference.function)
            .await?;
        let task = match &reference.id {
            Some(id) => self.find_task(id).await?,
            None => {
                self.find_task_for_function(
                    &reference.project,
                    &reference.function,
                    &reference.task_kind,
                )
                .await?
            }
        };
        Ok((function, task))
    }
}

/// Identity a credentials lookup is made for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// Acting user.
    pub user: Option<String>,
    /// Project the runnable belongs to.
    pub project: String,
}

/// One set of credentials, exposed to executions as environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Credential kind, e.g. `s3` or `registry`.
    pub kind: String,
    /// Variables to inject.
    pub values: BTreeMap<String, String>,
}

/// Source of per-user credentials. Absence means ambient credentials.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Credentials for `auth`.
    async fn credentials(&self, auth: &AuthContext) -> Result<Vec<Credentials>>;
}

/// Run repository kept in memory.
#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: RwLock<HashMap<String, Run>>,
}

impl InMemoryRunRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn find(&self, id: &str) -> Result<Run> {
        self.runs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("run", id))
    }

    async fn save(&self, run: &Run) -> Result<()> {
        let mut run = run.clone();
        run.updated_at = Utc::now();
        self.runs.write().await.insert(run.id.clone(), run);
        Ok(())
    }

    async fn list(&self, project: &str) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .read()
            .await
            .values()
            .filter(|run| run.project == project)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }
}

/// Definition repository kept in memory.
#[derive(Default)]
pub struct InMemoryDefinitionRepository {
    functions: RwLock<Vec<Function>>,
    tasks: RwLock<Vec<Task>>,
}

impl InMemoryDefinitionRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a function (keyed by project and name).
    pub async fn put_function(&self, function: Function) {
        let mut functions = self.functions.write().await;
        functions.retain(|f| !(f.project == function.project && f.name == function.name));
        functions.push(function);
    }

    /// Add or replace a task (keyed by ID).
    pub async fn put_task(&self, task: Task) {
        let mut tasks = self.tasks.write().await;
        tasks.retain(|t| t.id != task.id);
        tasks.push(task);
    }
}

#[async_trait]
impl DefinitionRepository for InMemoryDefinitionRepository {
    async fn find_function(&self, project: &str, name: &str) -> Result<Function> {
        self.functions
            .read()
            .await
            .iter()
            .find(|f| f.project == project && f.name == name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("function", format!("{}/{}", project, name)))
    }

    async fn find_task(&self, id: &str) -> Result<Task> {
        self.tasks
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("task", id))
    }

    async fn find_task_for_function(
        &self,
        project: &str,
        function: &str,
        kind: &str,
    ) -> Result<Task> {
        self.tasks
            .read()
            .await
            .iter()
            .find(|t| {
                t.project == project
                    && t.task_kind() == kind
                    && t.spec
                        .function
                        .as_deref()
                        .and_then(|reference| reference.split_once("://"))
                        .is_some_and(|(_, path)| {
                            let name = path.split_once('/').map_or(path, |(_, name)| name);
                            name.split(':').next() == Some(function)
                        })
            })
            .cloned()
            .ok_or_else(|| {
                CoreError::not_found("task", format!("{}/{} ({})", project, function, kind))
            })
    }
}

/// Credentials provider returning a fixed set for every identity.
#[derive(Default)]
pub struct StaticCredentialsProvider {
    credentials: Vec<Credentials>,
}

impl StaticCredentialsProvider {
    /// Provider handing out `credentials`.
    pub fn new(credentials: Vec<Credentials>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentialsProvider {
    async fn credentials(&self, _auth: &AuthContext) -> Result<Vec<Credentials>> {
        Ok(self.credentials.clone())
    }
}
