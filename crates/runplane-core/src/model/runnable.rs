// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Substrate-specific execution descriptors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::definition::{Resources, Volume};
use super::state::State;

/// Execution descriptor produced by a runtime and executed by a framework.
///
/// The ID equals the ID of the run it was produced for, so there is at most
/// one runnable per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runnable {
    /// Run ID.
    pub id: String,
    /// Owning project.
    pub project: String,
    /// Runtime kind that produced it.
    pub runtime: String,
    /// Qualified task kind, e.g. `container+job`.
    pub task: String,
    /// Runnable kind; selects the framework and the store.
    pub kind: String,
    /// Acting user, stamped by the lifecycle manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Current state.
    pub state: State,
    /// Substrate message, usually set on errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Results reported by the substrate.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, Value>,

    /// Container image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Entrypoint command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Command arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
    /// Volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Resource requests.
    #[serde(default)]
    pub resources: Resources,
    /// Replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Cron schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Retries allowed by the substrate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<u32>,
    /// Node placement constraints.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Secret names to expose.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Runnable {
    /// Bare runnable in READY.
    pub fn new(
        id: impl Into<String>,
        project: impl Into<String>,
        runtime: impl Into<String>,
        task: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project: project.into(),
            runtime: runtime.into(),
            task: task.into(),
            kind: kind.into(),
            user: None,
            state: State::Ready,
            message: None,
            results: BTreeMap::new(),
            image: None,
            command: None,
            args: Vec::new(),
            envs: BTreeMap::new(),
            volumes: Vec::new(),
            resources: Resources::default(),
            replicas: None,
            schedule: None,
            backoff_limit: None,
            node_selector: BTreeMap::new(),
            secrets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `state` and bump `updated_at`.
    pub fn set_state(&mut self, state: State) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Move to ERROR with a diagnostic.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
        self.set_state(State::Error);
    }
}
