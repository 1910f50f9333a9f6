// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Run entity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::definition::{ExecutionProfile, FunctionSpec};
use super::state::{RunEvent, State};

/// One execution attempt of a task/function pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Immutable unique identifier.
    pub id: String,
    /// Owning project.
    pub project: String,
    /// Run kind; selects the runtime.
    pub kind: String,
    /// Acting user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// What to execute.
    pub spec: RunSpec,
    /// Where the run is in its lifecycle.
    pub status: RunStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// New run in CREATED with a generated ID.
    pub fn new(project: impl Into<String>, kind: impl Into<String>, spec: RunSpec) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project: project.into(),
            kind: kind.into(),
            user: None,
            spec,
            status: RunStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Override the generated ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the acting user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.status.state
    }
}

/// Run specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Task reference, `<runtime>+<task>://<project>/<function>[:<id>]`.
    pub task: String,
    /// Function payload, embedded by the build step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionSpec>,
    /// Run-level execution overrides.
    #[serde(default, flatten)]
    pub profile: ExecutionProfile,
    /// Argument override replacing the function's default arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Free parameters passed through to the runtime.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
}

impl RunSpec {
    /// Spec targeting `task` with no overrides.
    pub fn for_task(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }
}

/// Run status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Current state.
    pub state: State,
    /// Human-readable detail, usually set on errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Results reported by the substrate.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, Value>,
    /// Committed transitions, oldest first.
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            state: State::Created,
            message: None,
            results: BTreeMap::new(),
            transitions: Vec::new(),
        }
    }
}

impl RunStatus {
    /// Merge a patch produced by a lifecycle callback.
    pub fn apply(&mut self, patch: StatusPatch) {
        if patch.message.is_some() {
            self.message = patch.message;
        }
        self.results.extend(patch.results);
    }
}

/// Partial status update returned by runtime callbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusPatch {
    /// Replaces the message when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Merged into the result map.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, Value>,
}

impl StatusPatch {
    /// Whether the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.results.is_empty()
    }
}

/// One committed transition in a run's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before.
    pub from: State,
    /// State after.
    pub to: State,
    /// Triggering event.
    pub event: RunEvent,
    /// Commit time.
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_starts_created() {
        let run = Run::new("proj", "container", RunSpec::for_task("container+job://proj/fn"));
        assert_eq!(run.state(), State::Created);
        assert!(run.status.transitions.is_empty());
        assert!(Uuid::parse_str(&run.id).is_ok());
    }

    #[test]
    fn test_status_patch_merges_results() {
        let mut status = RunStatus {
            message: Some("old".to_string()),
            results: BTreeMap::from([("a".to_string(), Value::from(1))]),
            ..Default::default()
        };

        status.apply(StatusPatch {
            message: None,
            results: BTreeMap::from([("b".to_string(), Value::from(2))]),
        });

        assert_eq!(status.message.as_deref(), Some("old"));
        assert_eq!(status.results.len(), 2);
    }

    #[test]
    fn test_spec_profile_is_flattened() {
        let json = serde_json::json!({
            "task": "container+job://proj/fn",
            "envs": {"MODE": "fast"},
            "args": ["--once"]
        });
        let spec: RunSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.profile.envs["MODE"], "fast");
        assert_eq!(spec.args, Some(vec!["--once".to_string()]));
    }
}
