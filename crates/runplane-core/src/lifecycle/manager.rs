// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run lifecycle manager.
//!
//! Wires the run state machine to the run entity. Every transition is
//! committed in the same order:
//!
//! 1. the state machine runs the transition logic (runtime calls),
//! 2. the run's state, spec and status are updated and a transition record
//!    is appended,
//! 3. the run is saved,
//! 4. the effect runs (by default: publish the produced runnable).
//!
//! Callers serialize requests for the same run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::dispatch::{DeleteMode, Framework, FrameworkRegistry, RuntimeRegistry, locate_runnable};
use crate::error::{CoreError, Result};
use crate::events::EventBus;
use crate::fsm::{FsmDefinition, TransitionOutcome};
use crate::model::{Run, RunEvent, Runnable, State, TaskRef, TransitionRecord};
use crate::repository::{DefinitionRepository, RunRepository};
use crate::store::RunnableStores;

use super::run_fsm::{RunContext, RunFsm, RunInput, run_fsm};

/// Effect executed after a transition has been saved.
#[async_trait]
pub trait RunEffect: Send + Sync {
    /// React to a committed transition. Returns the run as it stands after
    /// the effect, which may have moved it further.
    async fn apply(
        &self,
        manager: &RunLifecycleManager,
        run: Run,
        outcome: TransitionOutcome<RunFsm>,
    ) -> Result<Run>;
}

/// Effect used by [`RunLifecycleManager::perform`] and
/// [`RunLifecycleManager::handle`].
///
/// A produced runnable is stamped with the acting user and published. On
/// DELETING, frameworks declaring [`DeleteMode::Synchronous`] are torn down
/// inline, and a run with nothing to tear down moves straight to DELETED.
pub struct DefaultEffect;

#[async_trait]
impl RunEffect for DefaultEffect {
    async fn apply(
        &self,
        manager: &RunLifecycleManager,
        run: Run,
        outcome: TransitionOutcome<RunFsm>,
    ) -> Result<Run> {
        let runnable = outcome.output.and_then(|output| output.runnable);

        match runnable {
            Some(mut runnable) => {
                runnable.user.clone_from(&run.user);

                if outcome.event == RunEvent::Deleting {
                    let framework = manager.frameworks.get(&runnable.kind)?;
                    if framework.capabilities().delete_mode == DeleteMode::Synchronous {
                        return manager.teardown(framework.as_ref(), run, runnable).await;
                    }
                }

                debug!(
                    run_id = %run.id,
                    kind = %runnable.kind,
                    state = %runnable.state,
                    "Publishing produced runnable"
                );
                manager.bus.produced(runnable);
                Ok(run)
            }
            None if outcome.event == RunEvent::Deleting && run.state() == State::Deleting => {
                manager.acknowledge_delete(run).await
            }
            None => Ok(run),
        }
    }
}

enum Request {
    Event(RunEvent),
    Target(State),
}

/// Drives runs through the run state machine.
pub struct RunLifecycleManager {
    definition: Arc<FsmDefinition<RunFsm>>,
    runtimes: RuntimeRegistry,
    frameworks: FrameworkRegistry,
    stores: RunnableStores,
    runs: Arc<dyn RunRepository>,
    definitions: Option<Arc<dyn DefinitionRepository>>,
    bus: EventBus,
    substrate_timeout: Duration,
}

impl RunLifecycleManager {
    /// Create a manager. Fails when the registration tables are inconsistent.
    pub fn new(
        runtimes: RuntimeRegistry,
        frameworks: FrameworkRegistry,
        stores: RunnableStores,
        runs: Arc<dyn RunRepository>,
        bus: EventBus,
    ) -> Result<Self> {
        runtimes.validate(&frameworks, &stores)?;
        Ok(Self {
            definition: Arc::new(run_fsm()?),
            runtimes,
            frameworks,
            stores,
            runs,
            definitions: None,
            bus,
            substrate_timeout: Duration::from_secs(30),
        })
    }

    /// Timeout for framework calls made inline by the default effect.
    pub fn with_substrate_timeout(mut self, timeout: Duration) -> Self {
        self.substrate_timeout = timeout;
        self
    }

    /// Attach the definition repository used by [`build`](Self::build).
    pub fn with_definitions(mut self, definitions: Arc<dyn DefinitionRepository>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    /// Runtime registration table.
    pub fn runtimes(&self) -> &RuntimeRegistry {
        &self.runtimes
    }

    /// Framework registration table.
    pub fn frameworks(&self) -> &FrameworkRegistry {
        &self.frameworks
    }

    /// Runnable stores.
    pub fn stores(&self) -> &RunnableStores {
        &self.stores
    }

    /// Event bus the manager publishes on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Load a run.
    pub async fn find(&self, id: &str) -> Result<Run> {
        self.runs.find(id).await
    }

    /// Accept a new run in CREATED.
    ///
    /// The run kind must have a registered runtime and must match the runtime
    /// named by the task reference.
    pub async fn create(&self, mut run: Run) -> Result<Run> {
        if !self.runtimes.contains(&run.kind) {
            return Err(CoreError::UnknownRuntime(run.kind.clone()));
        }
        let task: TaskRef = run.spec.task.parse()?;
        if task.runtime != run.kind {
            return Err(CoreError::KindMismatch {
                expected: run.kind.clone(),
                actual: task.runtime,
            });
        }

        run.status.state = State::Created;
        run.status.transitions.clear();
        self.runs.save(&run).await?;

        info!(run_id = %run.id, kind = %run.kind, task = %run.spec.task, "Run created");
        Ok(run)
    }

    /// Apply `event` with the default effect.
    pub async fn perform(&self, run: Run, event: RunEvent, input: RunInput) -> Result<Run> {
        self.perform_with(run, event, input, &DefaultEffect).await
    }

    /// Apply `event` and run `effect` after the commit.
    pub async fn perform_with(
        &self,
        run: Run,
        event: RunEvent,
        input: RunInput,
        effect: &dyn RunEffect,
    ) -> Result<Run> {
        if event == RunEvent::Resume && run.state() == State::Stopped {
            self.ensure_resumable(&run).await?;
        }
        let (run, outcome) = self.transition(run, Request::Event(event), input).await?;
        match outcome {
            Some(outcome) => effect.apply(self, run, outcome).await,
            None => Ok(run),
        }
    }

    /// Move the run to `state` with the default effect.
    ///
    /// A run already in `state` without a self-transition is returned
    /// unchanged.
    pub async fn handle(&self, run: Run, state: State, input: RunInput) -> Result<Run> {
        self.handle_with(run, state, input, &DefaultEffect).await
    }

    /// Move the run to `state` and run `effect` after the commit.
    pub async fn handle_with(
        &self,
        run: Run,
        state: State,
        input: RunInput,
        effect: &dyn RunEffect,
    ) -> Result<Run> {
        let (run, outcome) = self.transition(run, Request::Target(state), input).await?;
        match outcome {
            Some(outcome) => effect.apply(self, run, outcome).await,
            None => Ok(run),
        }
    }

    /// Feed a changed runnable back into its run.
    pub async fn handle_runnable(&self, runnable: &Runnable) -> Result<Run> {
        let run = self.runs.find(&runnable.id).await?;
        self.handle(run, runnable.state, RunInput::Runnable(runnable.clone()))
            .await
    }

    /// BUILD the run, resolving its task and function.
    pub async fn build(&self, id: &str) -> Result<Run> {
        let definitions = self.definitions.as_ref().ok_or_else(|| {
            CoreError::Registration("no definition repository configured".to_string())
        })?;
        let run = self.runs.find(id).await?;
        let reference: TaskRef = run.spec.task.parse()?;
        let (function, task) = definitions.resolve(&reference).await?;
        self.perform(run, RunEvent::Build, RunInput::Build { function, task })
            .await
    }

    /// RUN the run, producing its runnable.
    pub async fn run(&self, id: &str) -> Result<Run> {
        let run = self.runs.find(id).await?;
        self.perform(run, RunEvent::Run, RunInput::None).await
    }

    /// STOP the run.
    pub async fn stop(&self, id: &str) -> Result<Run> {
        let run = self.runs.find(id).await?;
        self.perform(run, RunEvent::Stop, RunInput::None).await
    }

    /// RESUME a stopped run.
    pub async fn resume(&self, id: &str) -> Result<Run> {
        let run = self.runs.find(id).await?;
        self.perform(run, RunEvent::Resume, RunInput::None).await
    }

    /// Request deletion. Runs already DELETED or DELETING are returned as is.
    pub async fn delete(&self, id: &str) -> Result<Run> {
        let run = self.runs.find(id).await?;
        if matches!(run.state(), State::Deleting | State::Deleted) {
            debug!(run_id = %run.id, state = %run.state(), "Delete already in progress");
            return Ok(run);
        }
        self.perform(run, RunEvent::Deleting, RunInput::None).await
    }

    /// Reject RESUME before it commits when the runnable's framework cannot
    /// resume. A missing runnable is left to the transition logic.
    async fn ensure_resumable(&self, run: &Run) -> Result<()> {
        let runnable = match locate_runnable(&self.stores, run).await {
            Ok(runnable) => runnable,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let framework = self.frameworks.get(&runnable.kind)?;
        if !framework.capabilities().resume {
            return Err(CoreError::Unsupported {
                operation: "resume",
                handler: framework.kind().to_string(),
            });
        }
        Ok(())
    }

    /// Delete the runnable inline and acknowledge the deletion. On failure
    /// the run is moved to ERROR and the error is returned.
    async fn teardown(
        &self,
        framework: &dyn Framework,
        run: Run,
        runnable: Runnable,
    ) -> Result<Run> {
        let kind = runnable.kind.clone();
        let id = runnable.id.clone();
        let timeout = self.substrate_timeout;
        let deleted = tokio::time::timeout(timeout, framework.delete(runnable.clone()))
            .await
            .unwrap_or_else(|_| {
                Err(CoreError::Timeout {
                    operation: format!("delete {}", id),
                    timeout,
                })
            });
        if let Err(e) = deleted {
            return Err(self.fail_teardown(run, runnable, e).await);
        }

        self.stores.for_kind(&kind)?.remove(&id).await?;
        debug!(run_id = %run.id, kind = %kind, "Runnable deleted synchronously");
        self.acknowledge_delete(run).await
    }

    /// Move a run whose inline teardown failed from DELETING to ERROR so a
    /// later delete can retry. Returns the teardown error.
    async fn fail_teardown(&self, run: Run, mut runnable: Runnable, error: CoreError) -> CoreError {
        warn!(run_id = %run.id, error = %error, "Synchronous teardown failed");
        runnable.fail(error.to_string());
        let stored = match self.stores.for_kind(&runnable.kind) {
            Ok(store) => store.store(&runnable.id, &runnable).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            warn!(run_id = %run.id, error = %e, "Failed to store failed runnable");
        }
        let failed = self
            .transition(run, Request::Event(RunEvent::Error), RunInput::Runnable(runnable))
            .await;
        if let Err(e) = failed {
            warn!(error = %e, "Failed to move run to ERROR after teardown failure");
        }
        error
    }

    async fn acknowledge_delete(&self, run: Run) -> Result<Run> {
        let (run, _) = self
            .transition(run, Request::Event(RunEvent::Delete), RunInput::None)
            .await?;
        Ok(run)
    }

    async fn transition(
        &self,
        run: Run,
        request: Request,
        input: RunInput,
    ) -> Result<(Run, Option<TransitionOutcome<RunFsm>>)> {
        let runtime = self.runtimes.get(&run.kind)?;
        let mut machine = self.definition.machine(run.state());
        let context = RunContext {
            run,
            runtime,
            input,
        };

        let outcome = match request {
            Request::Event(event) => Some(machine.perform(event, &context).await?),
            Request::Target(target) => machine.go_to_state(target, &context).await?,
        };
        let mut run = context.run;
        let Some(mut outcome) = outcome else {
            return Ok((run, None));
        };

        let now = Utc::now();
        run.status.state = outcome.to;
        if let Some(output) = outcome.output.as_mut() {
            if let Some(spec) = output.spec.take() {
                run.spec = spec;
            }
            if let Some(patch) = output.status.take() {
                run.status.apply(patch);
            }
        }
        run.status.transitions.push(TransitionRecord {
            from: outcome.from,
            to: outcome.to,
            event: outcome.event,
            at: now,
        });
        run.updated_at = now;
        self.runs.save(&run).await?;

        info!(
            run_id = %run.id,
            from = %outcome.from,
            to = %outcome.to,
            event = %outcome.event,
            "Run transitioned"
        );
        Ok((run, Some(outcome)))
    }
}
