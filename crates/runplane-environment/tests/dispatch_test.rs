// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step-by-step dispatch through the container runtime, the event
//! processor and the monitor, without background tasks.

mod common;

use std::sync::Arc;

use runplane_core::dispatch::{FrameworkRegistry, RuntimeRegistry, SubstrateStatus};
use runplane_core::events::{EventBus, EventReceiver, RunnableEvent};
use runplane_core::lifecycle::RunLifecycleManager;
use runplane_core::model::{Run, RunSpec, State};
use runplane_core::repository::InMemoryRunRepository;
use runplane_core::store::{InMemoryRunnableStore, RunnableStore, RunnableStores};
use runplane_environment::frameworks::MockFramework;
use runplane_environment::monitor::{Monitor, MonitorConfig};
use runplane_environment::processor::{EventProcessor, EventProcessorConfig};
use runplane_environment::runtimes::ContainerRuntime;

use common::{definitions, hello_run};

struct Fixture {
    manager: Arc<RunLifecycleManager>,
    processor: EventProcessor,
    monitor: Monitor,
    jobs: Arc<MockFramework>,
    job_store: Arc<InMemoryRunnableStore>,
    events: EventReceiver,
}

async fn fixture() -> Fixture {
    let jobs = Arc::new(MockFramework::new("job"));
    let job_store = Arc::new(InMemoryRunnableStore::new("job"));

    let mut stores = RunnableStores::new();
    let mut frameworks = FrameworkRegistry::new();
    stores.register(job_store.clone()).unwrap();
    frameworks.register(jobs.clone()).unwrap();
    for kind in ["deployment", "service"] {
        stores.register(Arc::new(InMemoryRunnableStore::new(kind))).unwrap();
        frameworks.register(Arc::new(MockFramework::new(kind))).unwrap();
    }

    let mut runtimes = RuntimeRegistry::new();
    runtimes
        .register(Arc::new(ContainerRuntime::new(stores.clone())))
        .unwrap();

    let (bus, events) = EventBus::channel();
    let manager = RunLifecycleManager::new(
        runtimes,
        frameworks.clone(),
        stores.clone(),
        Arc::new(InMemoryRunRepository::new()),
        bus.clone(),
    )
    .unwrap()
    .with_definitions(definitions().await);
    let manager = Arc::new(manager);

    Fixture {
        processor: EventProcessor::new(
            manager.clone(),
            Vec::new(),
            EventProcessorConfig::default(),
        ),
        monitor: Monitor::new(stores, frameworks, bus, MonitorConfig::default()),
        manager,
        jobs,
        job_store,
        events,
    }
}

impl Fixture {
    /// Feed every pending event to the processor, including the ones it
    /// publishes itself.
    async fn drain(&mut self) -> Vec<RunnableEvent> {
        let mut handled = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            handled.push(event.clone());
            self.processor.handle(event).await;
        }
        handled
    }
}

#[tokio::test]
async fn test_build_and_run_produces_ready_job() {
    let mut fx = fixture().await;
    let run = fx.manager.create(hello_run()).await.unwrap();
    let built = fx.manager.build(&run.id).await.unwrap();
    assert_eq!(built.state(), State::Built);
    assert!(built.spec.function.is_some());

    let ready = fx.manager.run(&run.id).await.unwrap();
    assert_eq!(ready.state(), State::Ready);

    let Ok(RunnableEvent::Produced(runnable)) = fx.events.try_recv() else {
        panic!("expected a produced runnable");
    };
    assert_eq!(runnable.image.as_deref(), Some("busybox"));
    assert_eq!(runnable.state, State::Ready);
    assert_eq!(runnable.task, "container+job");
    assert_eq!(runnable.kind, "job");
    assert_eq!(runnable.user.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_pinned_task_reference_resolves_by_id() {
    let mut fx = fixture().await;
    let run = Run::new("proj", "container", RunSpec::for_task("container+job://proj/hello:t-job"));
    let run = fx.manager.create(run).await.unwrap();
    fx.manager.build(&run.id).await.unwrap();
    fx.manager.run(&run.id).await.unwrap();

    let Ok(RunnableEvent::Produced(runnable)) = fx.events.try_recv() else {
        panic!("expected a produced runnable");
    };
    assert_eq!(runnable.image.as_deref(), Some("busybox"));
    assert_eq!(runnable.task, "container+job");
    assert_eq!(runnable.kind, "job");
}

#[tokio::test]
async fn test_pinned_task_of_other_kind_is_rejected() {
    let mut fx = fixture().await;
    let spec = RunSpec::for_task("container+job://proj/hello:t-serve");
    let run = fx.manager.create(Run::new("proj", "container", spec)).await.unwrap();

    let err = fx.manager.build(&run.id).await.unwrap_err();
    assert_eq!(err.error_code(), "KIND_MISMATCH");
    assert_eq!(fx.manager.find(&run.id).await.unwrap().state(), State::Created);
    assert!(fx.drain().await.is_empty());
}

#[tokio::test]
async fn test_processor_submits_and_run_follows() {
    let mut fx = fixture().await;
    let run = fx.manager.create(hello_run()).await.unwrap();
    fx.manager.build(&run.id).await.unwrap();
    fx.manager.run(&run.id).await.unwrap();

    let handled = fx.drain().await;
    let names: Vec<_> = handled.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["produced", "changed"]);

    assert_eq!(fx.jobs.count("run"), 1);
    assert_eq!(fx.job_store.find(&run.id).await.unwrap().state, State::Running);
    assert_eq!(fx.manager.find(&run.id).await.unwrap().state(), State::Running);
}

#[tokio::test]
async fn test_monitor_completion_converges_with_one_change() {
    let mut fx = fixture().await;
    let run = fx.manager.create(hello_run()).await.unwrap();
    fx.manager.build(&run.id).await.unwrap();
    fx.manager.run(&run.id).await.unwrap();
    fx.drain().await;

    fx.jobs.set_status(&run.id, SubstrateStatus::phase("Succeeded"));
    let report = fx.monitor.monitor().await;
    assert_eq!(report.changed, 1);

    let handled = fx.drain().await;
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].runnable().state, State::Completed);
    assert_eq!(fx.manager.find(&run.id).await.unwrap().state(), State::Completed);

    // A completed runnable is no longer polled.
    let report = fx.monitor.monitor().await;
    assert_eq!(report.checked, 0);
    assert!(fx.drain().await.is_empty());
}

#[tokio::test]
async fn test_monitor_failure_keeps_message() {
    let mut fx = fixture().await;
    let run = fx.manager.create(hello_run()).await.unwrap();
    fx.manager.build(&run.id).await.unwrap();
    fx.manager.run(&run.id).await.unwrap();
    fx.drain().await;

    fx.jobs.set_status(
        &run.id,
        SubstrateStatus::phase("Failed").with_message("OOMKilled"),
    );
    fx.monitor.monitor().await;
    fx.drain().await;

    let run = fx.manager.find(&run.id).await.unwrap();
    assert_eq!(run.state(), State::Error);
    assert_eq!(run.status.message.as_deref(), Some("OOMKilled"));
    let runnable = fx.job_store.find(&run.id).await.unwrap();
    assert_eq!(runnable.message.as_deref(), Some("OOMKilled"));
}

#[tokio::test]
async fn test_stop_and_resume_roundtrip() {
    let mut fx = fixture().await;
    let run = fx.manager.create(hello_run()).await.unwrap();
    fx.manager.build(&run.id).await.unwrap();
    fx.manager.run(&run.id).await.unwrap();
    fx.drain().await;

    assert_eq!(fx.manager.stop(&run.id).await.unwrap().state(), State::Stop);
    fx.drain().await;
    assert_eq!(fx.manager.find(&run.id).await.unwrap().state(), State::Stopped);
    assert_eq!(fx.job_store.find(&run.id).await.unwrap().state, State::Stopped);

    assert_eq!(fx.manager.resume(&run.id).await.unwrap().state(), State::Resume);
    fx.drain().await;
    assert_eq!(fx.manager.find(&run.id).await.unwrap().state(), State::Running);
    assert_eq!(fx.jobs.count("resume"), 1);
}

#[tokio::test]
async fn test_asynchronous_delete_removes_runnable() {
    let mut fx = fixture().await;
    let run = fx.manager.create(hello_run()).await.unwrap();
    fx.manager.build(&run.id).await.unwrap();
    fx.manager.run(&run.id).await.unwrap();
    fx.drain().await;

    let deleting = fx.manager.delete(&run.id).await.unwrap();
    assert_eq!(deleting.state(), State::Deleting);
    fx.drain().await;

    assert_eq!(fx.manager.find(&run.id).await.unwrap().state(), State::Deleted);
    assert!(fx.job_store.find(&run.id).await.unwrap_err().is_not_found());
    assert!(!fx.jobs.has_object(&run.id));

    // Deleting again changes nothing and publishes nothing.
    let again = fx.manager.delete(&run.id).await.unwrap();
    assert_eq!(again.state(), State::Deleted);
    assert!(fx.drain().await.is_empty());
    assert_eq!(fx.jobs.count("delete"), 1);
}

#[tokio::test]
async fn test_submission_failure_marks_run_error() {
    let mut fx = fixture().await;
    fx.jobs.fail_next_runs(10);

    let run = fx.manager.create(hello_run()).await.unwrap();
    fx.manager.build(&run.id).await.unwrap();
    fx.manager.run(&run.id).await.unwrap();

    tokio::time::pause();
    fx.drain().await;

    // One attempt plus two retries.
    assert_eq!(fx.jobs.count("run"), 3);
    let runnable = fx.job_store.find(&run.id).await.unwrap();
    assert_eq!(runnable.state, State::Error);
    assert!(runnable.message.unwrap().contains("timed out"));
    assert_eq!(fx.manager.find(&run.id).await.unwrap().state(), State::Error);
}
