// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for runplane-core integration tests.
//!
//! Provides a stub runtime and framework and a TestContext wiring them into a
//! lifecycle manager backed by in-memory collaborators.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use runplane_core::dispatch::{
    DeleteMode, Framework, FrameworkCapabilities, FrameworkRegistry, Runtime, RuntimeRegistry,
    SubstrateStatus, ensure_kind, locate_runnable, mark_runnable,
};
use runplane_core::error::{CoreError, Result};
use runplane_core::events::{EventBus, EventReceiver, RunnableEvent};
use runplane_core::model::{
    Function, FunctionSpec, Run, RunSpec, Runnable, State, Task, TaskRef, TaskSpec,
};
use runplane_core::repository::{InMemoryDefinitionRepository, InMemoryRunRepository};
use runplane_core::store::{InMemoryRunnableStore, RunnableStore, RunnableStores};
use runplane_core::RunLifecycleManager;

pub const KIND: &str = "stub";
pub const TASK: &str = "stub+job://proj/hello";

/// Runtime producing `stub` runnables.
pub struct StubRuntime {
    stores: RunnableStores,
}

impl StubRuntime {
    pub fn new(stores: RunnableStores) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl Runtime for StubRuntime {
    fn kind(&self) -> &str {
        KIND
    }

    fn runnable_kinds(&self) -> Vec<String> {
        vec![KIND.to_string()]
    }

    fn build(&self, function: &Function, task: &Task, run: &Run) -> Result<RunSpec> {
        ensure_kind(self, run)?;
        let mut spec = run.spec.clone();
        spec.profile.fill_from(&task.spec.profile);
        spec.function = Some(function.spec.clone());
        Ok(spec)
    }

    async fn run(&self, run: &Run) -> Result<Runnable> {
        let task: TaskRef = run.spec.task.parse()?;
        let mut runnable = Runnable::new(
            &run.id,
            &run.project,
            KIND,
            task.qualified_kind(),
            KIND,
        );
        if let Some(function) = &run.spec.function {
            runnable.image.clone_from(&function.image);
        }
        runnable.envs = run.spec.profile.envs.clone();
        Ok(runnable)
    }

    async fn stop(&self, run: &Run) -> Result<Runnable> {
        mark_runnable(&self.stores, run, State::Stop).await
    }

    async fn resume(&self, run: &Run) -> Result<Runnable> {
        mark_runnable(&self.stores, run, State::Resume).await
    }

    async fn delete(&self, run: &Run) -> Result<Option<Runnable>> {
        let mut runnable = locate_runnable(&self.stores, run).await?;
        runnable.set_state(State::Deleting);
        Ok(Some(runnable))
    }
}

/// Framework recording every call.
pub struct StubFramework {
    delete_mode: DeleteMode,
    resume: AtomicBool,
    delete_failures: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl StubFramework {
    pub fn new(delete_mode: DeleteMode) -> Self {
        Self {
            delete_mode,
            resume: AtomicBool::new(true),
            delete_failures: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Declare whether resume is supported.
    pub fn set_resume(&self, supported: bool) {
        self.resume.store(supported, Ordering::SeqCst);
    }

    /// Make the next `n` deletes fail.
    pub fn fail_next_deletes(&self, n: usize) {
        self.delete_failures.store(n, Ordering::SeqCst);
    }

    async fn record(&self, call: &str, runnable: &Runnable) {
        self.calls
            .lock()
            .await
            .push(format!("{}:{}", call, runnable.id));
    }
}

#[async_trait]
impl Framework for StubFramework {
    fn kind(&self) -> &str {
        KIND
    }

    fn capabilities(&self) -> FrameworkCapabilities {
        FrameworkCapabilities {
            resume: self.resume.load(Ordering::SeqCst),
            delete_mode: self.delete_mode,
        }
    }

    async fn run(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.record("run", &runnable).await;
        runnable.set_state(State::Running);
        Ok(runnable)
    }

    async fn stop(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.record("stop", &runnable).await;
        runnable.set_state(State::Stopped);
        Ok(runnable)
    }

    async fn delete(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.record("delete", &runnable).await;
        let failing = self
            .delete_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CoreError::framework(KIND, "substrate unreachable"));
        }
        runnable.set_state(State::Deleted);
        Ok(runnable)
    }

    async fn resume(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.record("resume", &runnable).await;
        runnable.set_state(State::Running);
        Ok(runnable)
    }

    async fn status(&self, _runnable: &Runnable) -> Result<SubstrateStatus> {
        Err(CoreError::Unsupported {
            operation: "status",
            handler: KIND.to_string(),
        })
    }
}

/// Manager wired to stub plugins and in-memory collaborators.
pub struct TestContext {
    pub manager: RunLifecycleManager,
    pub store: Arc<InMemoryRunnableStore>,
    pub framework: Arc<StubFramework>,
    pub definitions: Arc<InMemoryDefinitionRepository>,
    pub runs: Arc<InMemoryRunRepository>,
    pub events: EventReceiver,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_delete_mode(DeleteMode::Asynchronous).await
    }

    pub async fn with_delete_mode(delete_mode: DeleteMode) -> Self {
        let store = Arc::new(InMemoryRunnableStore::new(KIND));
        let mut stores = RunnableStores::new();
        stores.register(store.clone()).unwrap();

        let framework = Arc::new(StubFramework::new(delete_mode));
        let mut frameworks = FrameworkRegistry::new();
        frameworks.register(framework.clone()).unwrap();

        let mut runtimes = RuntimeRegistry::new();
        runtimes
            .register(Arc::new(StubRuntime::new(stores.clone())))
            .unwrap();

        let definitions = Arc::new(InMemoryDefinitionRepository::new());
        definitions.put_function(hello_function()).await;
        definitions.put_task(hello_task()).await;

        let runs = Arc::new(InMemoryRunRepository::new());
        let (bus, events) = EventBus::channel();

        let manager = RunLifecycleManager::new(runtimes, frameworks, stores, runs.clone(), bus)
            .unwrap()
            .with_definitions(definitions.clone());

        Self {
            manager,
            store,
            framework,
            definitions,
            runs,
            events,
        }
    }

    /// Create a run for the hello task.
    pub async fn create_run(&self) -> Run {
        let run = Run::new("proj", KIND, RunSpec::for_task(TASK)).with_user("alice");
        self.manager.create(run).await.unwrap()
    }

    /// Create, build and run; the produced runnable is stored like the event
    /// processor would.
    pub async fn ready_run(&mut self) -> Run {
        let run = self.create_run().await;
        self.manager.build(&run.id).await.unwrap();
        let run = self.manager.run(&run.id).await.unwrap();
        let runnable = self.expect_produced().await;
        self.store.store(&runnable.id, &runnable).await.unwrap();
        run
    }

    /// Next event, which must be a produced runnable.
    pub async fn expect_produced(&mut self) -> Runnable {
        match self.events.try_recv() {
            Ok(RunnableEvent::Produced(runnable)) => runnable,
            other => panic!("expected produced event, got {:?}", other),
        }
    }

    /// Whether no event is pending.
    pub fn no_events(&mut self) -> bool {
        self.events.try_recv().is_err()
    }
}

pub fn hello_function() -> Function {
    Function {
        id: "f1".to_string(),
        project: "proj".to_string(),
        name: "hello".to_string(),
        kind: KIND.to_string(),
        spec: FunctionSpec {
            image: Some("busybox".to_string()),
            command: Some("echo".to_string()),
            args: vec!["hello".to_string()],
            source: None,
        },
    }
}

pub fn hello_task() -> Task {
    let mut task = Task {
        id: "t1".to_string(),
        project: "proj".to_string(),
        kind: "stub+job".to_string(),
        spec: TaskSpec {
            function: Some("stub://proj/hello".to_string()),
            ..Default::default()
        },
    };
    task.spec.profile.envs = BTreeMap::from([("LOG_LEVEL".to_string(), "debug".to_string())]);
    task
}
