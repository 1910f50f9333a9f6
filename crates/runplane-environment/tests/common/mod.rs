// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test utilities for runplane-environment integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use runplane_core::events::RunnableListener;
use runplane_core::lifecycle::RunLifecycleManager;
use runplane_core::model::{Function, FunctionSpec, Run, RunSpec, Runnable, State, Task, TaskSpec};
use runplane_core::repository::InMemoryDefinitionRepository;
use runplane_core::store::InMemoryRunnableStore;
use runplane_environment::frameworks::MockFramework;
use runplane_environment::runtime::{EngineRuntime, EngineRuntimeBuilder};

/// Task reference of the hello job.
pub const HELLO_JOB: &str = "container+job://proj/hello";

/// Container function running busybox.
pub fn hello_function() -> Function {
    Function {
        id: "f-hello".to_string(),
        project: "proj".to_string(),
        name: "hello".to_string(),
        kind: "container".to_string(),
        spec: FunctionSpec {
            image: Some("busybox".to_string()),
            command: Some("echo".to_string()),
            args: vec!["hello".to_string()],
            source: None,
        },
    }
}

/// Task for the hello function.
pub fn hello_task(kind: &str) -> Task {
    Task {
        id: format!("t-{}", kind),
        project: "proj".to_string(),
        kind: format!("container+{}", kind),
        spec: TaskSpec {
            function: Some("container://proj/hello".to_string()),
            ..Default::default()
        },
    }
}

/// Definition repository holding the hello function and its tasks.
pub async fn definitions() -> Arc<InMemoryDefinitionRepository> {
    let definitions = Arc::new(InMemoryDefinitionRepository::new());
    definitions.put_function(hello_function()).await;
    for kind in ["job", "deploy", "serve"] {
        definitions.put_task(hello_task(kind)).await;
    }
    definitions
}

/// Fresh run of the hello job.
pub fn hello_run() -> Run {
    Run::new("proj", "container", RunSpec::for_task(HELLO_JOB)).with_user("alice")
}

/// Listener recording every changed runnable.
#[derive(Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<Runnable>>,
}

impl RecordingListener {
    /// Changed runnables for `id` that reached `state`.
    pub fn count(&self, id: &str, state: State) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.id == id && r.state == state)
            .count()
    }
}

#[async_trait]
impl RunnableListener for RecordingListener {
    async fn on_changed(&self, runnable: &Runnable) {
        self.seen.lock().unwrap().push(runnable.clone());
    }
}

/// Running engine backed by mock frameworks.
pub struct Harness {
    pub runtime: EngineRuntime,
    pub jobs: Arc<MockFramework>,
    pub job_store: Arc<InMemoryRunnableStore>,
    pub listener: Arc<RecordingListener>,
}

impl Harness {
    /// Engine with fast timers.
    pub async fn start() -> Self {
        Self::start_with(|builder| builder).await
    }

    /// Engine with fast timers, customised by `configure`.
    pub async fn start_with(
        configure: impl FnOnce(EngineRuntimeBuilder) -> EngineRuntimeBuilder,
    ) -> Self {
        Self::start_with_jobs(MockFramework::new("job"), configure).await
    }

    /// Engine with fast timers running jobs on `jobs`.
    pub async fn start_with_jobs(
        jobs: MockFramework,
        configure: impl FnOnce(EngineRuntimeBuilder) -> EngineRuntimeBuilder,
    ) -> Self {
        let jobs = Arc::new(jobs);
        let job_store = Arc::new(InMemoryRunnableStore::new("job"));
        let listener = Arc::new(RecordingListener::default());

        let builder = EngineRuntime::builder()
            .container_runtime()
            .definitions(definitions().await)
            .listener(listener.clone())
            .store(job_store.clone())
            .framework(jobs.clone())
            .store(Arc::new(InMemoryRunnableStore::new("deployment")))
            .framework(Arc::new(MockFramework::new("deployment")))
            .store(Arc::new(InMemoryRunnableStore::new("service")))
            .framework(Arc::new(MockFramework::new("service")))
            .monitor_interval(Duration::from_millis(20))
            .substrate_timeout(Duration::from_secs(1))
            .retry_backoff(Duration::from_millis(5));

        let runtime = configure(builder).build().unwrap().start().await.unwrap();
        Self {
            runtime,
            jobs,
            job_store,
            listener,
        }
    }

    /// Lifecycle manager.
    pub fn manager(&self) -> &RunLifecycleManager {
        self.runtime.manager()
    }

    /// Create, build and run the hello job.
    pub async fn submit(&self) -> Run {
        let run = self.manager().create(hello_run()).await.unwrap();
        self.manager().build(&run.id).await.unwrap();
        self.manager().run(&run.id).await.unwrap()
    }

    /// Wait until run `id` is in `state`.
    pub async fn wait_for(&self, id: &str, state: State) -> Run {
        wait_for_state(self.manager(), id, state).await
    }
}

/// Poll the run until it reaches `state`, failing after five seconds.
pub async fn wait_for_state(manager: &RunLifecycleManager, id: &str, state: State) -> Run {
    let poll = async {
        loop {
            let run = manager.find(id).await.unwrap();
            if run.state() == state {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    match tokio::time::timeout(Duration::from_secs(5), poll).await {
        Ok(run) => run,
        Err(_) => {
            let run = manager.find(id).await.unwrap();
            panic!("run {} stuck in {} waiting for {}", id, run.state(), state);
        }
    }
}
