// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dispatch chain: Runtime → Framework → Runnable.
//!
//! A [`Runtime`] interprets one run kind and produces runnables. A
//! [`Framework`] submits runnables of one kind to a substrate. Both are
//! looked up through explicit registration tables built at start; the
//! runtime table is validated against the framework and store tables so that
//! every runnable kind a runtime may produce has a home.

mod framework;
mod runtime;

pub use framework::*;
pub use runtime::*;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::error::Result;
    use crate::model::{Function, Run, RunSpec, Runnable, Task};
    use crate::store::{InMemoryRunnableStore, RunnableStore, RunnableStores};

    struct EchoRuntime;

    #[async_trait]
    impl Runtime for EchoRuntime {
        fn kind(&self) -> &str {
            "echo"
        }

        fn runnable_kinds(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }

        fn build(&self, _function: &Function, _task: &Task, run: &Run) -> Result<RunSpec> {
            Ok(run.spec.clone())
        }

        async fn run(&self, run: &Run) -> Result<Runnable> {
            Ok(Runnable::new(&run.id, &run.project, "echo", "echo+say", "echo"))
        }

        async fn stop(&self, run: &Run) -> Result<Runnable> {
            self.run(run).await
        }

        async fn resume(&self, run: &Run) -> Result<Runnable> {
            self.run(run).await
        }

        async fn delete(&self, _run: &Run) -> Result<Option<Runnable>> {
            Ok(None)
        }
    }

    struct EchoFramework;

    #[async_trait]
    impl Framework for EchoFramework {
        fn kind(&self) -> &str {
            "echo"
        }

        async fn run(&self, runnable: Runnable) -> Result<Runnable> {
            Ok(runnable)
        }

        async fn stop(&self, runnable: Runnable) -> Result<Runnable> {
            Ok(runnable)
        }

        async fn delete(&self, runnable: Runnable) -> Result<Runnable> {
            Ok(runnable)
        }

        async fn status(&self, _runnable: &Runnable) -> Result<SubstrateStatus> {
            Ok(SubstrateStatus::phase("Running"))
        }
    }

    #[test]
    fn test_registry_rejects_duplicates_and_unknown() {
        let mut runtimes = RuntimeRegistry::new();
        runtimes.register(Arc::new(EchoRuntime)).unwrap();
        assert!(runtimes.register(Arc::new(EchoRuntime)).is_err());
        assert_eq!(runtimes.get("nope").err().unwrap().error_code(), "UNKNOWN_RUNTIME");

        let mut frameworks = FrameworkRegistry::new();
        frameworks.register(Arc::new(EchoFramework)).unwrap();
        assert!(frameworks.register(Arc::new(EchoFramework)).is_err());
        assert_eq!(
            frameworks.get("nope").err().unwrap().error_code(),
            "UNKNOWN_FRAMEWORK"
        );
    }

    #[test]
    fn test_validate_requires_framework_and_store() {
        let mut runtimes = RuntimeRegistry::new();
        runtimes.register(Arc::new(EchoRuntime)).unwrap();

        let mut frameworks = FrameworkRegistry::new();
        let mut stores = RunnableStores::new();
        assert!(runtimes.validate(&frameworks, &stores).is_err());

        frameworks.register(Arc::new(EchoFramework)).unwrap();
        assert!(runtimes.validate(&frameworks, &stores).is_err());

        stores
            .register(Arc::new(InMemoryRunnableStore::new("echo")))
            .unwrap();
        runtimes.validate(&frameworks, &stores).unwrap();
    }

    #[tokio::test]
    async fn test_resume_unsupported_by_default() {
        let runnable = Runnable::new("r1", "proj", "echo", "echo+say", "echo");
        let err = EchoFramework.resume(runnable).await.unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED");
    }

    #[tokio::test]
    async fn test_default_callbacks_copy_substrate_report() {
        let run = Run::new("proj", "echo", RunSpec::for_task("echo+say://proj/fn"));
        let mut runnable = Runnable::new(&run.id, "proj", "echo", "echo+say", "echo");
        runnable.fail("OOMKilled");

        assert!(EchoRuntime.on_running(&run, &runnable).await.unwrap().is_none());
        let patch = EchoRuntime.on_error(&run, &runnable).await.unwrap().unwrap();
        assert_eq!(patch.message.as_deref(), Some("OOMKilled"));
    }

    #[tokio::test]
    async fn test_locate_runnable_matches_task_kind() {
        let store = Arc::new(InMemoryRunnableStore::new("echo"));
        let stores = RunnableStores::new().with(store.clone()).unwrap();

        let run = Run::new("proj", "echo", RunSpec::for_task("echo+say://proj/fn"));
        let err = locate_runnable(&stores, &run).await.unwrap_err();
        assert!(err.is_not_found());

        let runnable = Runnable::new(&run.id, "proj", "echo", "echo+say", "echo");
        store.store(&run.id, &runnable).await.unwrap();
        let found = mark_runnable(&stores, &run, crate::model::State::Stop)
            .await
            .unwrap();
        assert_eq!(found.state, crate::model::State::Stop);
    }
}
