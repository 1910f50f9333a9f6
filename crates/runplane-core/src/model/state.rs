// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! States and events shared by runs and runnables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a run or runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Run accepted, not yet built.
    Created,
    /// Spec resolved against its task and function.
    Built,
    /// Runnable produced, waiting for submission.
    Ready,
    /// Submitted, substrate has not started it yet.
    Pending,
    /// Executing on the substrate.
    Running,
    /// Finished successfully.
    Completed,
    /// Failed.
    Error,
    /// Stop requested.
    Stop,
    /// Stopped on the substrate.
    Stopped,
    /// Resume requested.
    Resume,
    /// Deletion requested.
    Deleting,
    /// Deleted. Terminal.
    Deleted,
}

impl State {
    /// All states, in lifecycle order.
    pub const ALL: [State; 12] = [
        State::Created,
        State::Built,
        State::Ready,
        State::Pending,
        State::Running,
        State::Completed,
        State::Error,
        State::Stop,
        State::Stopped,
        State::Resume,
        State::Deleting,
        State::Deleted,
    ];

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Created => "CREATED",
            State::Built => "BUILT",
            State::Ready => "READY",
            State::Pending => "PENDING",
            State::Running => "RUNNING",
            State::Completed => "COMPLETED",
            State::Error => "ERROR",
            State::Stop => "STOP",
            State::Stopped => "STOPPED",
            State::Resume => "RESUME",
            State::Deleting => "DELETING",
            State::Deleted => "DELETED",
        }
    }

    /// Whether a runnable in this state is expected to exist on the substrate.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            State::Ready | State::Pending | State::Running | State::Stop | State::Resume
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown state '{}'", s))
    }
}

/// Event requesting a run transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEvent {
    /// Resolve the spec.
    Build,
    /// Produce the runnable.
    Run,
    /// Substrate accepted but has not started.
    Pending,
    /// Substrate started execution.
    Execute,
    /// Substrate reports the run is still executing.
    Loop,
    /// Substrate reports success.
    Complete,
    /// Something failed.
    Error,
    /// Stop, or acknowledge a stop.
    Stop,
    /// Resume a stopped run.
    Resume,
    /// Request deletion.
    Deleting,
    /// Acknowledge deletion.
    Delete,
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunEvent::Build => "BUILD",
            RunEvent::Run => "RUN",
            RunEvent::Pending => "PENDING",
            RunEvent::Execute => "EXECUTE",
            RunEvent::Loop => "LOOP",
            RunEvent::Complete => "COMPLETE",
            RunEvent::Error => "ERROR",
            RunEvent::Stop => "STOP",
            RunEvent::Resume => "RESUME",
            RunEvent::Deleting => "DELETING",
            RunEvent::Delete => "DELETE",
        };
        f.write_str(name)
    }
}
