// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Framework contract and registration table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::model::{Runnable, State};

/// How a framework tears runnables down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Deleted inline by the lifecycle manager; the run reaches DELETED
    /// within the same call.
    Synchronous,
    /// Deleted by the event processor; the run reaches DELETED when the
    /// "changed" event comes back.
    #[default]
    Asynchronous,
}

/// What a framework supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameworkCapabilities {
    /// Whether stopped runnables can be resumed.
    pub resume: bool,
    /// Teardown path.
    pub delete_mode: DeleteMode,
}

/// Normalized substrate status used by the monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubstrateStatus {
    /// Substrate phase string, e.g. `Running`, `Succeeded`, `Failed`.
    pub phase: String,
    /// Substrate message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Results reported by the substrate.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, Value>,
}

impl SubstrateStatus {
    /// Status with only a phase.
    pub fn phase(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            ..Default::default()
        }
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// State this phase maps to, `None` when the phase is not terminal.
    pub fn state(&self) -> Option<State> {
        map_phase(&self.phase)
    }
}

/// Map a substrate phase to a runnable state.
///
/// `Succeeded` maps to COMPLETED and `Failed` or `Error` map to ERROR. Every
/// other phase leaves the runnable unchanged.
pub fn map_phase(phase: &str) -> Option<State> {
    if phase.eq_ignore_ascii_case("succeeded") {
        Some(State::Completed)
    } else if phase.eq_ignore_ascii_case("failed") || phase.eq_ignore_ascii_case("error") {
        Some(State::Error)
    } else {
        None
    }
}

/// Handler for one execution substrate.
///
/// Frameworks confirm submission only; completion is observed through
/// [`Framework::status`]. Stop and delete are idempotent and a missing
/// substrate object on delete is success.
#[async_trait]
pub trait Framework: Send + Sync {
    /// Runnable kind handled by this framework.
    fn kind(&self) -> &str;

    /// Supported operations.
    fn capabilities(&self) -> FrameworkCapabilities {
        FrameworkCapabilities::default()
    }

    /// Submit the runnable. Returns it in RUNNING (or PENDING).
    async fn run(&self, runnable: Runnable) -> Result<Runnable>;

    /// Stop the runnable. Returns it in STOPPED.
    async fn stop(&self, runnable: Runnable) -> Result<Runnable>;

    /// Delete the runnable. Returns it in DELETED.
    async fn delete(&self, runnable: Runnable) -> Result<Runnable>;

    /// Resume a stopped runnable. Returns it in RUNNING.
    async fn resume(&self, _runnable: Runnable) -> Result<Runnable> {
        Err(CoreError::Unsupported {
            operation: "resume",
            handler: self.kind().to_string(),
        })
    }

    /// Read the current substrate status.
    async fn status(&self, runnable: &Runnable) -> Result<SubstrateStatus>;
}

/// Registration table of frameworks, keyed by runnable kind.
#[derive(Clone, Default)]
pub struct FrameworkRegistry {
    frameworks: HashMap<String, Arc<dyn Framework>>,
}

impl FrameworkRegistry {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a framework. Fails if its kind is already taken.
    pub fn register(&mut self, framework: Arc<dyn Framework>) -> Result<()> {
        let kind = framework.kind().to_string();
        if self.frameworks.contains_key(&kind) {
            return Err(CoreError::Registration(format!(
                "framework '{}' registered twice",
                kind
            )));
        }
        self.frameworks.insert(kind, framework);
        Ok(())
    }

    /// Framework for `kind`.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn Framework>> {
        self.frameworks
            .get(kind)
            .cloned()
            .ok_or_else(|| CoreError::UnknownFramework(kind.to_string()))
    }

    /// Whether a framework is registered for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.frameworks.contains_key(kind)
    }
}
