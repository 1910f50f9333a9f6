// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process framework tests running real `sh` children.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use runplane_core::dispatch::{Framework, SubstrateStatus};
use runplane_core::model::{Runnable, State};
use runplane_core::repository::{Credentials, StaticCredentialsProvider};
use runplane_environment::frameworks::{ProcessFramework, ProcessFrameworkConfig};
use tempfile::TempDir;

fn framework(dir: &TempDir) -> ProcessFramework {
    ProcessFramework::new(
        "job",
        ProcessFrameworkConfig {
            data_dir: dir.path().to_path_buf(),
            container_cli: None,
        },
    )
}

fn shell(id: &str, script: &str) -> Runnable {
    let mut runnable = Runnable::new(id, "proj", "container", "container+job", "job");
    runnable.command = Some("sh".to_string());
    runnable.args = vec!["-c".to_string(), script.to_string()];
    runnable
}

async fn wait_for_exit(framework: &ProcessFramework, runnable: &Runnable) -> SubstrateStatus {
    let poll = async {
        loop {
            let status = framework.status(runnable).await.unwrap();
            if status.phase != "Running" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .expect("process did not exit")
}

#[tokio::test]
async fn test_successful_process() {
    let dir = TempDir::new().unwrap();
    let framework = framework(&dir);

    let running = framework.run(shell("ok", "echo hello")).await.unwrap();
    assert_eq!(running.state, State::Running);

    let status = wait_for_exit(&framework, &running).await;
    assert_eq!(status.phase, "Succeeded");
    assert_eq!(status.state(), Some(State::Completed));

    let stdout = std::fs::read_to_string(framework.run_dir("ok").join("stdout.log")).unwrap();
    assert_eq!(stdout.trim(), "hello");
}

#[tokio::test]
async fn test_failed_process_reports_stderr() {
    let dir = TempDir::new().unwrap();
    let framework = framework(&dir);

    let running = framework
        .run(shell("bad", "echo 'out of memory' >&2; exit 3"))
        .await
        .unwrap();
    let status = wait_for_exit(&framework, &running).await;
    assert_eq!(status.phase, "Failed");
    assert_eq!(status.state(), Some(State::Error));
    assert_eq!(status.message.as_deref(), Some("out of memory"));
}

#[tokio::test]
async fn test_failed_process_without_stderr() {
    let dir = TempDir::new().unwrap();
    let framework = framework(&dir);

    let running = framework.run(shell("quiet", "exit 7")).await.unwrap();
    let status = wait_for_exit(&framework, &running).await;
    assert_eq!(status.phase, "Failed");
    assert!(status.message.unwrap().contains('7'));
}

#[tokio::test]
async fn test_stop_and_delete() {
    let dir = TempDir::new().unwrap();
    let framework = framework(&dir);

    let running = framework.run(shell("long", "sleep 30")).await.unwrap();
    assert_eq!(framework.status(&running).await.unwrap().phase, "Running");

    let stopped = framework.stop(running.clone()).await.unwrap();
    assert_eq!(stopped.state, State::Stopped);
    assert_eq!(framework.status(&running).await.unwrap().phase, "Stopped");

    // Stop is idempotent.
    framework.stop(running.clone()).await.unwrap();

    let deleted = framework.delete(running.clone()).await.unwrap();
    assert_eq!(deleted.state, State::Deleted);
    assert!(!framework.run_dir("long").exists());
    assert!(framework.status(&running).await.unwrap_err().is_not_found());

    // Deleting again succeeds.
    let deleted = framework.delete(running).await.unwrap();
    assert_eq!(deleted.state, State::Deleted);
}

#[tokio::test]
async fn test_resume_unsupported() {
    let dir = TempDir::new().unwrap();
    let framework = framework(&dir);
    let err = framework.resume(shell("r", "true")).await.unwrap_err();
    assert_eq!(err.error_code(), "UNSUPPORTED");
    assert!(!framework.capabilities().resume);
}

#[tokio::test]
async fn test_missing_command_fails_submission() {
    let dir = TempDir::new().unwrap();
    let framework = framework(&dir);
    let runnable = Runnable::new("nocmd", "proj", "container", "container+job", "job");
    let err = framework.run(runnable).await.unwrap_err();
    assert_eq!(err.error_code(), "FRAMEWORK_ERROR");
}

#[tokio::test]
async fn test_credentials_and_envs_injected() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(StaticCredentialsProvider::new(vec![Credentials {
        kind: "registry".to_string(),
        values: BTreeMap::from([("API_TOKEN".to_string(), "secret".to_string())]),
    }]));
    let framework = framework(&dir).with_credentials(provider);

    let mut runnable = shell("creds", "echo \"$API_TOKEN $GREETING\"");
    runnable.envs.insert("GREETING".to_string(), "hi".to_string());
    let running = framework.run(runnable).await.unwrap();
    wait_for_exit(&framework, &running).await;

    let stdout = std::fs::read_to_string(framework.run_dir("creds").join("stdout.log")).unwrap();
    assert_eq!(stdout.trim(), "secret hi");
}
