// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scriptable framework for tests and dry runs.
//!
//! Nothing is executed. Submitted runnables become substrate objects whose
//! phase is `Running` until a test scripts another one with
//! [`MockFramework::set_status`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use runplane_core::dispatch::{DeleteMode, Framework, FrameworkCapabilities, SubstrateStatus};
use runplane_core::error::{CoreError, Result};
use runplane_core::model::{Runnable, State};

/// Operation recorded by [`MockFramework`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Operation name: `run`, `stop`, `resume`, `delete` or `status`.
    pub operation: &'static str,
    /// Runnable ID.
    pub id: String,
}

#[derive(Default)]
struct MockState {
    objects: HashMap<String, SubstrateStatus>,
    calls: Vec<MockCall>,
    status_delay: Option<Duration>,
    run_delays: HashMap<String, Duration>,
}

/// Framework keeping substrate objects in memory.
pub struct MockFramework {
    kind: String,
    capabilities: FrameworkCapabilities,
    state: Mutex<MockState>,
    failing_runs: AtomicUsize,
    failing_deletes: AtomicUsize,
}

impl MockFramework {
    /// Asynchronous-delete framework for `kind` supporting resume.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            capabilities: FrameworkCapabilities {
                resume: true,
                delete_mode: DeleteMode::Asynchronous,
            },
            state: Mutex::new(MockState::default()),
            failing_runs: AtomicUsize::new(0),
            failing_deletes: AtomicUsize::new(0),
        }
    }

    /// Same as [`new`](Self::new) but torn down inline by the manager.
    pub fn synchronous(kind: impl Into<String>) -> Self {
        let mut framework = Self::new(kind);
        framework.capabilities.delete_mode = DeleteMode::Synchronous;
        framework
    }

    /// Same as [`new`](Self::new) but without resume support.
    pub fn without_resume(kind: impl Into<String>) -> Self {
        let mut framework = Self::new(kind);
        framework.capabilities.resume = false;
        framework
    }

    /// Script the status reported for `id`.
    pub fn set_status(&self, id: &str, status: SubstrateStatus) {
        self.lock().objects.insert(id.to_string(), status);
    }

    /// Drop the substrate object for `id`, as if removed out of band.
    pub fn remove_object(&self, id: &str) {
        self.lock().objects.remove(id);
    }

    /// Whether a substrate object exists for `id`.
    pub fn has_object(&self, id: &str) -> bool {
        self.lock().objects.contains_key(id)
    }

    /// Delay every status read by `delay`. `None` answers immediately.
    pub fn set_status_delay(&self, delay: Option<Duration>) {
        self.lock().status_delay = delay;
    }

    /// Hold the submission of `id` for `delay` before answering.
    pub fn delay_run(&self, id: &str, delay: Duration) {
        self.lock().run_delays.insert(id.to_string(), delay);
    }

    /// Make the next `count` submissions time out.
    pub fn fail_next_runs(&self, count: usize) {
        self.failing_runs.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` deletes fail with a framework error.
    pub fn fail_next_deletes(&self, count: usize) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    /// Operations seen so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of times `operation` was called.
    pub fn count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only means a test panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, operation: &'static str, id: &str) {
        self.lock().calls.push(MockCall {
            operation,
            id: id.to_string(),
        });
    }
}

#[async_trait]
impl Framework for MockFramework {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn capabilities(&self) -> FrameworkCapabilities {
        self.capabilities
    }

    async fn run(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.record("run", &runnable.id);
        let delay = self.lock().run_delays.get(&runnable.id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failing_runs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CoreError::Timeout {
                operation: format!("{} run {}", self.kind, runnable.id),
                timeout: Duration::ZERO,
            });
        }

        self.set_status(&runnable.id, SubstrateStatus::phase("Running"));
        runnable.set_state(State::Running);
        debug!(runnable_id = %runnable.id, kind = %self.kind, "Mock runnable submitted");
        Ok(runnable)
    }

    async fn stop(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.record("stop", &runnable.id);
        if let Some(status) = self.lock().objects.get_mut(&runnable.id) {
            *status = SubstrateStatus::phase("Stopped");
        }
        runnable.set_state(State::Stopped);
        Ok(runnable)
    }

    async fn resume(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.record("resume", &runnable.id);
        self.set_status(&runnable.id, SubstrateStatus::phase("Running"));
        runnable.set_state(State::Running);
        Ok(runnable)
    }

    async fn delete(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.record("delete", &runnable.id);
        let failing = self
            .failing_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CoreError::framework(&self.kind, "substrate unreachable"));
        }
        self.remove_object(&runnable.id);
        runnable.set_state(State::Deleted);
        Ok(runnable)
    }

    async fn status(&self, runnable: &Runnable) -> Result<SubstrateStatus> {
        self.record("status", &runnable.id);
        let delay = self.lock().status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lock()
            .objects
            .get(&runnable.id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("substrate object", &runnable.id))
    }
}
