// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Upstream definitions a run is derived from: functions, tasks, and the
//! execution profile they share with runs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Payload definition: what to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Function ID.
    pub id: String,
    /// Owning project.
    pub project: String,
    /// Function name, unique per project.
    pub name: String,
    /// Runtime kind interpreting this function.
    pub kind: String,
    /// Payload.
    #[serde(default)]
    pub spec: FunctionSpec,
}

/// Function payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Container image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Entrypoint command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Default command arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Inline or remote source code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceCode>,
}

/// Source code attached to a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCode {
    /// Remote location (git, s3, http).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Entry handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// Execution profile definition: how to execute a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task ID.
    pub id: String,
    /// Owning project.
    pub project: String,
    /// Task kind, either bare (`job`) or qualified (`container+job`).
    pub kind: String,
    /// Profile and function reference.
    #[serde(default)]
    pub spec: TaskSpec,
}

impl Task {
    /// Task kind without the runtime qualifier.
    pub fn task_kind(&self) -> &str {
        self.kind
            .split_once('+')
            .map(|(_, kind)| kind)
            .unwrap_or(&self.kind)
    }
}

/// Task body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Function reference (`<runtime>://<project>/<name>[:<id>]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Execution profile defaults.
    #[serde(default, flatten)]
    pub profile: ExecutionProfile,
}

/// Resource requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// CPU request, e.g. `500m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory request, e.g. `1Gi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// GPU count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
}

impl Resources {
    fn fill_from(&mut self, defaults: &Resources) {
        fill(&mut self.cpu, &defaults.cpu);
        fill(&mut self.memory, &defaults.memory);
        fill(&mut self.gpu, &defaults.gpu);
    }
}

/// Volume mounted into the execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name, unique within a profile.
    pub name: String,
    /// Mount path inside the execution.
    pub mount_path: String,
    /// Host path or claim backing the volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Execution settings shared by tasks (defaults) and runs (overrides).
///
/// Merge rule applied by [`ExecutionProfile::fill_from`]: the receiver wins on
/// every conflicting key and the defaults only fill gaps. Optional fields keep
/// the receiver's value when set, maps insert a default key only when absent,
/// and lists append default items whose name is not already present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    /// Resource requests.
    #[serde(default)]
    pub resources: Resources,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
    /// Volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Secret names to expose.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    /// Node placement constraints.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Replica count for long-running workloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Cron schedule for recurring jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Retries allowed by the substrate before the execution fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<u32>,
}

impl ExecutionProfile {
    /// Fill unset values from `defaults` without overriding anything set here.
    pub fn fill_from(&mut self, defaults: &ExecutionProfile) {
        self.resources.fill_from(&defaults.resources);

        for (key, value) in &defaults.envs {
            self.envs
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in &defaults.node_selector {
            self.node_selector
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        for volume in &defaults.volumes {
            if !self.volumes.iter().any(|v| v.name == volume.name) {
                self.volumes.push(volume.clone());
            }
        }
        for secret in &defaults.secrets {
            if !self.secrets.contains(secret) {
                self.secrets.push(secret.clone());
            }
        }

        fill(&mut self.replicas, &defaults.replicas);
        fill(&mut self.schedule, &defaults.schedule);
        fill(&mut self.backoff_limit, &defaults.backoff_limit);
    }
}

fn fill<T: Clone>(target: &mut Option<T>, default: &Option<T>) {
    if target.is_none() {
        target.clone_from(default);
    }
}

/// Parsed task reference: `<runtime>+<task>://<project>/<function>[:<id>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    /// Runtime kind, e.g. `container`.
    pub runtime: String,
    /// Task kind, e.g. `job`.
    pub task_kind: String,
    /// Project.
    pub project: String,
    /// Function name.
    pub function: String,
    /// Task ID when pinned.
    pub id: Option<String>,
}

impl TaskRef {
    /// Qualified task kind as stamped on runnables, e.g. `container+job`.
    pub fn qualified_kind(&self) -> String {
        format!("{}+{}", self.runtime, self.task_kind)
    }
}

impl FromStr for TaskRef {
    type Err = CoreError;

    fn from_str(reference: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidTaskRef {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let (kind, path) = reference
            .split_once("://")
            .ok_or_else(|| invalid("missing '://' separator"))?;
        let (runtime, task_kind) = kind
            .split_once('+')
            .ok_or_else(|| invalid("kind must be '<runtime>+<task>'"))?;
        let (project, function) = path
            .split_once('/')
            .ok_or_else(|| invalid("path must be '<project>/<function>'"))?;
        let (function, id) = match function.split_once(':') {
            Some((name, id)) => (name, Some(id.to_string())),
            None => (function, None),
        };

        if runtime.is_empty() || task_kind.is_empty() {
            return Err(invalid("runtime and task kind must not be empty"));
        }
        if project.is_empty() || function.is_empty() {
            return Err(invalid("project and function must not be empty"));
        }
        if id.as_deref() == Some("") {
            return Err(invalid("task id must not be empty"));
        }

        Ok(TaskRef {
            runtime: runtime.to_string(),
            task_kind: task_kind.to_string(),
            project: project.to_string(),
            function: function.to_string(),
            id,
        })
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}://{}/{}",
            self.runtime, self.task_kind, self.project, self.function
        )?;
        if let Some(id) = &self.id {
            write!(f, ":{}", id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_ref() {
        let task: TaskRef = "container+job://proj/fn:task-id".parse().unwrap();
        assert_eq!(task.runtime, "container");
        assert_eq!(task.task_kind, "job");
        assert_eq!(task.project, "proj");
        assert_eq!(task.function, "fn");
        assert_eq!(task.id.as_deref(), Some("task-id"));
        assert_eq!(task.qualified_kind(), "container+job");
        assert_eq!(task.to_string(), "container+job://proj/fn:task-id");
    }

    #[test]
    fn test_parse_task_ref_without_id() {
        let task: TaskRef = "container+serve://proj/model".parse().unwrap();
        assert_eq!(task.id, None);
    }

    #[test]
    fn test_parse_task_ref_rejects_garbage() {
        for reference in [
            "container+job",
            "container://proj/fn",
            "container+job://proj",
            "+job://proj/fn",
            "container+job://proj/fn:",
        ] {
            let err = reference.parse::<TaskRef>().unwrap_err();
            assert_eq!(err.error_code(), "INVALID_TASK_REF", "{}", reference);
        }
    }

    #[test]
    fn test_task_kind_strips_runtime() {
        let task = Task {
            id: "t1".to_string(),
            project: "proj".to_string(),
            kind: "container+deploy".to_string(),
            spec: TaskSpec::default(),
        };
        assert_eq!(task.task_kind(), "deploy");
    }

    #[test]
    fn test_profile_run_overrides_task() {
        let mut run = ExecutionProfile {
            resources: Resources {
                cpu: Some("2".to_string()),
                ..Default::default()
            },
            envs: BTreeMap::from([("MODE".to_string(), "run".to_string())]),
            volumes: vec![Volume {
                name: "data".to_string(),
                mount_path: "/run-data".to_string(),
                source: None,
            }],
            ..Default::default()
        };
        let task = ExecutionProfile {
            resources: Resources {
                cpu: Some("1".to_string()),
                memory: Some("1Gi".to_string()),
                gpu: None,
            },
            envs: BTreeMap::from([
                ("MODE".to_string(), "task".to_string()),
                ("LOG".to_string(), "debug".to_string()),
            ]),
            volumes: vec![
                Volume {
                    name: "data".to_string(),
                    mount_path: "/task-data".to_string(),
                    source: None,
                },
                Volume {
                    name: "cache".to_string(),
                    mount_path: "/cache".to_string(),
                    source: None,
                },
            ],
            secrets: vec!["token".to_string()],
            replicas: Some(3),
            ..Default::default()
        };

        run.fill_from(&task);

        assert_eq!(run.resources.cpu.as_deref(), Some("2"));
        assert_eq!(run.resources.memory.as_deref(), Some("1Gi"));
        assert_eq!(run.envs["MODE"], "run");
        assert_eq!(run.envs["LOG"], "debug");
        assert_eq!(run.volumes.len(), 2);
        assert_eq!(run.volumes[0].mount_path, "/run-data");
        assert_eq!(run.volumes[1].name, "cache");
        assert_eq!(run.secrets, vec!["token".to_string()]);
        assert_eq!(run.replicas, Some(3));
    }
}
