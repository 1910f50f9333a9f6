// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local process framework.
//!
//! Executes a runnable as a child process of the environment, either the
//! runnable's command directly or `<cli> run <image>` when a container CLI
//! (`docker`, `podman`) is configured. Output goes to
//! `DATA_DIR/runs/<id>/stdout.log` and `stderr.log`.
//!
//! The substrate phase is derived from the child's exit status:
//!
//! | Child | Phase |
//! |-------|-------|
//! | still running | `Running` |
//! | exit code 0 | `Succeeded` |
//! | any other exit | `Failed` |
//! | stopped through [`Framework::stop`] | `Stopped` |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::fs;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use runplane_core::dispatch::{Framework, SubstrateStatus};
use runplane_core::error::{CoreError, Result};
use runplane_core::model::{Runnable, State};
use runplane_core::repository::{AuthContext, CredentialsProvider};

/// Maximum length of a failure message taken from stderr.
const MAX_MESSAGE_LEN: usize = 2000;

/// Configuration shared by process frameworks.
#[derive(Debug, Clone)]
pub struct ProcessFrameworkConfig {
    /// Root directory for per-run log directories.
    pub data_dir: PathBuf,
    /// Container CLI used for runnables with an image.
    pub container_cli: Option<String>,
}

impl Default for ProcessFrameworkConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".data"),
            container_cli: None,
        }
    }
}

struct Tracked {
    child: Child,
    /// Container name when started through the CLI.
    container: Option<String>,
    exit: Option<ExitStatus>,
    stopped: bool,
}

/// Framework executing runnables as local processes.
pub struct ProcessFramework {
    kind: String,
    config: ProcessFrameworkConfig,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    children: Mutex<HashMap<String, Tracked>>,
}

impl ProcessFramework {
    /// Framework for runnables of `kind`.
    pub fn new(kind: impl Into<String>, config: ProcessFrameworkConfig) -> Self {
        Self {
            kind: kind.into(),
            config,
            credentials: None,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Inject credentials from `provider` into every execution.
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Directory holding the logs of runnable `id`.
    pub fn run_dir(&self, id: &str) -> PathBuf {
        self.config.data_dir.join("runs").join(id)
    }

    fn children(&self) -> MutexGuard<'_, HashMap<String, Tracked>> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn error(&self, message: impl Into<String>) -> CoreError {
        CoreError::framework(&self.kind, message)
    }

    async fn environment(&self, runnable: &Runnable) -> Result<Vec<(String, String)>> {
        let mut envs: Vec<(String, String)> = Vec::new();
        if let Some(provider) = &self.credentials {
            let auth = AuthContext {
                user: runnable.user.clone(),
                project: runnable.project.clone(),
            };
            for credentials in provider.credentials(&auth).await? {
                debug!(
                    runnable_id = %runnable.id,
                    kind = %credentials.kind,
                    "Injecting credentials"
                );
                envs.extend(credentials.values);
            }
        }
        envs.extend(runnable.envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(envs)
    }

    fn command(
        &self,
        runnable: &Runnable,
        envs: &[(String, String)],
    ) -> Result<(Command, Option<String>)> {
        match (&self.config.container_cli, &runnable.image) {
            (Some(cli), Some(image)) => {
                let name = container_name(&runnable.id);
                let mut cmd = Command::new(cli);
                cmd.args(["run", "--rm", "--name", &name]);
                for (key, value) in envs {
                    cmd.arg("-e").arg(format!("{}={}", key, value));
                }
                for volume in &runnable.volumes {
                    if let Some(source) = &volume.source {
                        cmd.arg("-v").arg(format!("{}:{}", source, volume.mount_path));
                    }
                }
                cmd.arg(image);
                if let Some(command) = &runnable.command {
                    cmd.arg(command);
                }
                cmd.args(&runnable.args);
                Ok((cmd, Some(name)))
            }
            _ => {
                let command = runnable.command.as_ref().ok_or_else(|| {
                    self.error(format!("runnable {} has no command to execute", runnable.id))
                })?;
                let mut cmd = Command::new(command);
                cmd.args(&runnable.args).envs(envs.iter().cloned());
                Ok((cmd, None))
            }
        }
    }

    async fn failure_message(&self, id: &str, status: ExitStatus) -> String {
        let stderr_path = self.run_dir(id).join("stderr.log");
        if let Ok(content) = fs::read_to_string(&stderr_path).await
            && let Some(tail) = stderr_tail(&content)
        {
            return tail;
        }
        format!("process exited with {}", status)
    }

    fn terminate(&self, id: &str, pid: Option<u32>) -> Result<()> {
        let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return Ok(());
        };
        match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {
                debug!(runnable_id = %id, pid = pid, "Sent SIGTERM to process");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!(runnable_id = %id, pid = pid, "Process already dead (ESRCH)");
                Ok(())
            }
            Err(e) => Err(self.error(format!("failed to signal process {}: {}", pid, e))),
        }
    }

    async fn stop_container(&self, cli: &str, name: &str) -> Result<()> {
        let output = Command::new(cli)
            .args(["stop", name])
            .output()
            .await
            .map_err(|e| self.error(format!("failed to run {} stop: {}", cli, e)))?;
        if !output.status.success() {
            // The container may already be gone.
            warn!(
                container = %name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Container stop reported an error"
            );
        }
        Ok(())
    }

    /// Stop the child tracked for `id`, if it is still running.
    async fn halt(&self, id: &str) -> Result<()> {
        let target = {
            let mut children = self.children();
            let Some(tracked) = children.get_mut(id) else {
                return Ok(());
            };
            if tracked.exit.is_none()
                && let Ok(Some(status)) = tracked.child.try_wait()
            {
                tracked.exit = Some(status);
            }
            tracked.stopped = true;
            if tracked.exit.is_some() {
                return Ok(());
            }
            (tracked.container.clone(), tracked.child.id())
        };

        match (&self.config.container_cli, target) {
            (Some(cli), (Some(name), _)) => self.stop_container(cli, &name).await,
            (_, (_, pid)) => self.terminate(id, pid),
        }
    }
}

#[async_trait]
impl Framework for ProcessFramework {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn run(&self, mut runnable: Runnable) -> Result<Runnable> {
        let run_dir = self.run_dir(&runnable.id);
        fs::create_dir_all(&run_dir).await.map_err(|e| {
            self.error(format!("failed to create run directory {}: {}", run_dir.display(), e))
        })?;
        let stdout = log_file(&run_dir, "stdout.log").map_err(|e| self.error(e))?;
        let stderr = log_file(&run_dir, "stderr.log").map_err(|e| self.error(e))?;

        let envs = self.environment(&runnable).await?;
        let (mut cmd, container) = self.command(&runnable, &envs)?;
        cmd.current_dir(&run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        let child = cmd
            .spawn()
            .map_err(|e| self.error(format!("failed to spawn runnable {}: {}", runnable.id, e)))?;

        info!(
            runnable_id = %runnable.id,
            kind = %self.kind,
            pid = ?child.id(),
            container = ?container,
            "Process started"
        );

        let previous = self.children().insert(
            runnable.id.clone(),
            Tracked {
                child,
                container,
                exit: None,
                stopped: false,
            },
        );
        if previous.is_some() {
            warn!(runnable_id = %runnable.id, "Replaced a previously tracked process");
        }

        runnable.set_state(State::Running);
        Ok(runnable)
    }

    async fn stop(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.halt(&runnable.id).await?;
        runnable.set_state(State::Stopped);
        Ok(runnable)
    }

    async fn delete(&self, mut runnable: Runnable) -> Result<Runnable> {
        self.halt(&runnable.id).await?;
        self.children().remove(&runnable.id);

        let run_dir = self.run_dir(&runnable.id);
        match fs::remove_dir_all(&run_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(runnable_id = %runnable.id, error = %e, "Failed to remove run directory")
            }
        }

        debug!(runnable_id = %runnable.id, "Process runnable deleted");
        runnable.set_state(State::Deleted);
        Ok(runnable)
    }

    async fn status(&self, runnable: &Runnable) -> Result<SubstrateStatus> {
        let outcome = {
            let mut children = self.children();
            let tracked = children
                .get_mut(&runnable.id)
                .ok_or_else(|| CoreError::not_found("process", &runnable.id))?;
            if tracked.exit.is_none() {
                tracked.exit = tracked
                    .child
                    .try_wait()
                    .map_err(|e| self.error(format!("failed to poll process: {}", e)))?;
            }
            (tracked.stopped, tracked.exit)
        };

        match outcome {
            (true, _) => Ok(SubstrateStatus::phase("Stopped")),
            (false, None) => Ok(SubstrateStatus::phase("Running")),
            (false, Some(status)) if status.success() => Ok(SubstrateStatus::phase("Succeeded")),
            (false, Some(status)) => {
                let message = self.failure_message(&runnable.id, status).await;
                Ok(SubstrateStatus::phase("Failed").with_message(message))
            }
        }
    }
}

fn container_name(id: &str) -> String {
    format!("runplane-{}", id)
}

fn log_file(dir: &Path, name: &str) -> std::result::Result<std::fs::File, String> {
    let path = dir.join(name);
    std::fs::File::create(&path).map_err(|e| format!("failed to create {}: {}", path.display(), e))
}

/// Last non-empty stderr lines, bounded in length.
fn stderr_tail(content: &str) -> Option<String> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let tail = lines[lines.len().saturating_sub(10)..].join("\n");
    if tail.chars().count() > MAX_MESSAGE_LEN {
        let truncated: String = tail.chars().take(MAX_MESSAGE_LEN).collect();
        Some(format!("{}...", truncated))
    } else {
        Some(tail)
    }
}
