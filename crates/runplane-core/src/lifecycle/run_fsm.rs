// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The run state machine.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::dispatch::Runtime;
use crate::error::{CoreError, Result};
use crate::fsm::{Fsm, FsmDefinition, FsmError, FsmState, TransitionLogic};
use crate::model::{Function, Run, RunEvent, RunSpec, Runnable, State, StatusPatch, Task};

/// Type family of the run state machine.
pub struct RunFsm;

impl Fsm for RunFsm {
    type State = State;
    type Event = RunEvent;
    type Context = RunContext;
    type Output = RunTransitionOutput;
    type Error = CoreError;

    fn states() -> &'static [State] {
        &State::ALL
    }
}

/// Input accompanying a transition request.
#[derive(Debug, Clone, Default)]
pub enum RunInput {
    /// Nothing.
    #[default]
    None,
    /// Upstream definitions for BUILD.
    Build {
        /// Resolved function.
        function: Function,
        /// Resolved task.
        task: Task,
    },
    /// Runnable reported by a framework or the monitor.
    Runnable(Runnable),
}

impl RunInput {
    /// The runnable, if this input carries one.
    pub fn runnable(&self) -> Option<&Runnable> {
        match self {
            RunInput::Runnable(runnable) => Some(runnable),
            _ => None,
        }
    }
}

/// Context handed to run transition logic.
pub struct RunContext {
    /// Run as it was before the transition.
    pub run: Run,
    /// Runtime handling the run kind.
    pub runtime: Arc<dyn Runtime>,
    /// Caller input.
    pub input: RunInput,
}

/// What a run transition's logic produced.
#[derive(Debug, Clone, Default)]
pub struct RunTransitionOutput {
    /// Replacement spec (BUILD).
    pub spec: Option<RunSpec>,
    /// Status patch from a lifecycle callback.
    pub status: Option<StatusPatch>,
    /// Runnable to hand to the effect.
    pub runnable: Option<Runnable>,
}

impl RunTransitionOutput {
    fn runnable(runnable: Runnable) -> Self {
        Self {
            runnable: Some(runnable),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Build,
    Run,
    Stop,
    Resume,
    Delete,
    Running,
    Complete,
    Fail,
}

#[async_trait]
impl TransitionLogic<RunFsm> for Action {
    async fn apply(
        &self,
        from: State,
        _to: State,
        event: RunEvent,
        context: &RunContext,
    ) -> Result<Option<RunTransitionOutput>> {
        let run = &context.run;
        let runtime = &context.runtime;

        match self {
            Action::Build => {
                let RunInput::Build { function, task } = &context.input else {
                    return Err(CoreError::InvalidInput {
                        event: event.to_string(),
                        reason: "function and task are required".to_string(),
                    });
                };
                let spec = runtime.build(function, task, run)?;
                Ok(Some(RunTransitionOutput {
                    spec: Some(spec),
                    ..Default::default()
                }))
            }
            Action::Run => Ok(Some(RunTransitionOutput::runnable(runtime.run(run).await?))),
            Action::Stop => Ok(Some(RunTransitionOutput::runnable(runtime.stop(run).await?))),
            Action::Resume => Ok(Some(RunTransitionOutput::runnable(
                runtime.resume(run).await?,
            ))),
            Action::Delete => {
                // Nothing reached a substrate before RUN.
                if matches!(from, State::Created | State::Built) {
                    return Ok(None);
                }
                match runtime.delete(run).await {
                    Ok(runnable) => Ok(runnable.map(RunTransitionOutput::runnable)),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            }
            Action::Running | Action::Complete | Action::Fail => {
                let Some(runnable) = context.input.runnable() else {
                    return Ok(None);
                };
                let patch = match self {
                    Action::Running => runtime.on_running(run, runnable).await,
                    Action::Complete => runtime.on_complete(run, runnable).await,
                    _ => runtime.on_error(run, runnable).await,
                };
                match patch {
                    Ok(status) => Ok(Some(RunTransitionOutput {
                        status,
                        ..Default::default()
                    })),
                    Err(e) => {
                        warn!(
                            run_id = %run.id,
                            event = %event,
                            error = %e,
                            "Runtime callback failed"
                        );
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Build the run state machine definition.
pub fn run_fsm() -> std::result::Result<FsmDefinition<RunFsm>, FsmError> {
    let build: Arc<dyn TransitionLogic<RunFsm>> = Arc::new(Action::Build);
    let run: Arc<dyn TransitionLogic<RunFsm>> = Arc::new(Action::Run);
    let stop: Arc<dyn TransitionLogic<RunFsm>> = Arc::new(Action::Stop);
    let resume: Arc<dyn TransitionLogic<RunFsm>> = Arc::new(Action::Resume);
    let delete: Arc<dyn TransitionLogic<RunFsm>> = Arc::new(Action::Delete);
    let running: Arc<dyn TransitionLogic<RunFsm>> = Arc::new(Action::Running);
    let complete: Arc<dyn TransitionLogic<RunFsm>> = Arc::new(Action::Complete);
    let fail: Arc<dyn TransitionLogic<RunFsm>> = Arc::new(Action::Fail);

    FsmDefinition::builder()
        .state(
            FsmState::new(State::Created)
                .on_with(RunEvent::Build, State::Built, build)
                .on_with(RunEvent::Error, State::Error, fail.clone())
                .on_with(RunEvent::Deleting, State::Deleting, delete.clone()),
        )
        .state(
            FsmState::new(State::Built)
                .on_with(RunEvent::Run, State::Ready, run)
                .on_with(RunEvent::Error, State::Error, fail.clone())
                .on_with(RunEvent::Deleting, State::Deleting, delete.clone()),
        )
        .state(
            FsmState::new(State::Ready)
                .on_with(RunEvent::Execute, State::Running, running.clone())
                .on(RunEvent::Pending, State::Pending)
                .on_with(RunEvent::Error, State::Error, fail.clone())
                .on_with(RunEvent::Stop, State::Stop, stop.clone())
                .on_with(RunEvent::Deleting, State::Deleting, delete.clone()),
        )
        .state(
            FsmState::new(State::Pending)
                .on_with(RunEvent::Execute, State::Running, running.clone())
                .on_with(RunEvent::Error, State::Error, fail.clone())
                .on_with(RunEvent::Stop, State::Stop, stop.clone())
                .on_with(RunEvent::Deleting, State::Deleting, delete.clone()),
        )
        .state(
            FsmState::new(State::Running)
                .on_with(RunEvent::Loop, State::Running, running.clone())
                .on_with(RunEvent::Complete, State::Completed, complete)
                .on_with(RunEvent::Error, State::Error, fail.clone())
                .on_with(RunEvent::Stop, State::Stop, stop)
                .on_with(RunEvent::Deleting, State::Deleting, delete.clone()),
        )
        .state(
            FsmState::new(State::Stop)
                .on(RunEvent::Stop, State::Stopped)
                .on_with(RunEvent::Error, State::Error, fail.clone())
                .on_with(RunEvent::Deleting, State::Deleting, delete.clone()),
        )
        .state(
            FsmState::new(State::Stopped)
                .on_with(RunEvent::Resume, State::Resume, resume)
                .on_with(RunEvent::Deleting, State::Deleting, delete.clone()),
        )
        .state(
            FsmState::new(State::Resume)
                .on_with(RunEvent::Execute, State::Running, running)
                .on_with(RunEvent::Error, State::Error, fail.clone())
                .on_with(RunEvent::Deleting, State::Deleting, delete.clone()),
        )
        .state(FsmState::new(State::Completed).on_with(
            RunEvent::Deleting,
            State::Deleting,
            delete.clone(),
        ))
        .state(FsmState::new(State::Error).on_with(
            RunEvent::Deleting,
            State::Deleting,
            delete,
        ))
        .state(
            FsmState::new(State::Deleting)
                .on(RunEvent::Delete, State::Deleted)
                .on_with(RunEvent::Error, State::Error, fail),
        )
        .state(FsmState::new(State::Deleted))
        .build()
}
