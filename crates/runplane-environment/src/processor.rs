// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event processor consuming the runnable bus.
//!
//! "Produced" runnables are stored and handed to their framework according
//! to their state:
//!
//! | State | Framework call |
//! |-------|----------------|
//! | READY | `run` |
//! | STOP | `stop` |
//! | RESUME | `resume` |
//! | DELETING | `delete` |
//!
//! The framework's answer is stored (removed once DELETED) and republished
//! as "changed". "Changed" runnables fan out to the registered listeners
//! and are fed back to the lifecycle manager.
//!
//! Events are handled on one lane per runnable ID. A lane handles its
//! events in publish order; lanes run concurrently, at most
//! `max_concurrency` events at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use runplane_core::dispatch::Framework;
use runplane_core::error::{CoreError, Result};
use runplane_core::events::{EventReceiver, RunnableEvent, RunnableListener};
use runplane_core::lifecycle::RunLifecycleManager;
use runplane_core::model::{Runnable, State};

/// Configuration for the event processor.
#[derive(Debug, Clone)]
pub struct EventProcessorConfig {
    /// Timeout for a single framework call.
    pub submit_timeout: Duration,
    /// Additional attempts after a retryable failure.
    pub submit_retries: u32,
    /// Delay before the first retry; grows linearly with each attempt.
    pub retry_backoff: Duration,
    /// Events handled at the same time across all runnables.
    pub max_concurrency: usize,
}

impl Default for EventProcessorConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(30),
            submit_retries: 2,
            retry_backoff: Duration::from_secs(1),
            max_concurrency: 16,
        }
    }
}

/// Queue of pending events for one runnable ID.
struct Lane {
    id: String,
    events: UnboundedReceiver<RunnableEvent>,
}

/// Consumer of the runnable event bus.
pub struct EventProcessor {
    manager: Arc<RunLifecycleManager>,
    listeners: Vec<Arc<dyn RunnableListener>>,
    config: EventProcessorConfig,
    shutdown: Arc<Notify>,
}

impl EventProcessor {
    /// Create a new processor.
    pub fn new(
        manager: Arc<RunLifecycleManager>,
        listeners: Vec<Arc<dyn RunnableListener>>,
        config: EventProcessorConfig,
    ) -> Self {
        Self {
            manager,
            listeners,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Consume `events` until shutdown is signalled or every publisher is
    /// gone.
    ///
    /// On shutdown, in-flight events are abandoned. When the bus closes,
    /// every queued event is handled first.
    pub async fn run(self: Arc<Self>, mut events: EventReceiver) {
        info!(
            submit_timeout_secs = self.config.submit_timeout.as_secs(),
            submit_retries = self.config.submit_retries,
            max_concurrency = self.config.max_concurrency,
            "Event processor started"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut lanes: HashMap<String, UnboundedSender<RunnableEvent>> = HashMap::new();
        let mut workers: JoinSet<Lane> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Event processor received shutdown signal");
                    workers.shutdown().await;
                    break;
                }

                Some(done) = workers.join_next() => {
                    Self::retire(&self, done, &mut lanes, &mut workers, &permits);
                }

                event = events.recv() => match event {
                    Some(event) => Self::route(&self, event, &mut lanes, &mut workers, &permits),
                    None => {
                        info!("Event bus closed");
                        while let Some(done) = workers.join_next().await {
                            Self::retire(&self, done, &mut lanes, &mut workers, &permits);
                        }
                        break;
                    }
                }
            }
        }

        info!("Event processor stopped");
    }

    fn route(
        this: &Arc<Self>,
        event: RunnableEvent,
        lanes: &mut HashMap<String, UnboundedSender<RunnableEvent>>,
        workers: &mut JoinSet<Lane>,
        permits: &Arc<Semaphore>,
    ) {
        let id = event.runnable().id.clone();
        let event = match lanes.get(&id) {
            Some(lane) => match lane.send(event) {
                Ok(()) => return,
                // The lane's worker died; open a fresh one.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        lanes.insert(id.clone(), sender);
        let lane = Lane {
            id,
            events: receiver,
        };
        workers.spawn(this.clone().drain(lane, event, permits.clone()));
    }

    /// Close a lane whose worker finished, or restart it when events arrived
    /// in the meantime.
    fn retire(
        this: &Arc<Self>,
        done: std::result::Result<Lane, tokio::task::JoinError>,
        lanes: &mut HashMap<String, UnboundedSender<RunnableEvent>>,
        workers: &mut JoinSet<Lane>,
        permits: &Arc<Semaphore>,
    ) {
        let mut lane = match done {
            Ok(lane) => lane,
            Err(e) => {
                error!(error = %e, "Event lane worker failed");
                return;
            }
        };
        match lane.events.try_recv() {
            Ok(event) => {
                workers.spawn(this.clone().drain(lane, event, permits.clone()));
            }
            Err(_) => {
                lanes.remove(&lane.id);
            }
        }
    }

    async fn drain(
        self: Arc<Self>,
        mut lane: Lane,
        first: RunnableEvent,
        permits: Arc<Semaphore>,
    ) -> Lane {
        let mut next = Some(first);
        while let Some(event) = next {
            let _permit = permits.acquire().await.ok();
            self.handle(event).await;
            next = lane.events.try_recv().ok();
        }
        lane
    }

    /// Handle a single event. Failures are logged, never propagated.
    pub async fn handle(&self, event: RunnableEvent) {
        debug!(
            event = event.name(),
            runnable_id = %event.runnable().id,
            state = %event.runnable().state,
            "Handling runnable event"
        );
        match event {
            RunnableEvent::Produced(runnable) => {
                let id = runnable.id.clone();
                if let Err(e) = self.dispatch(runnable).await {
                    error!(runnable_id = %id, error = %e, "Failed to dispatch produced runnable");
                }
            }
            RunnableEvent::Changed(runnable) => self.changed(runnable).await,
        }
    }

    async fn changed(&self, runnable: Runnable) {
        for listener in &self.listeners {
            listener.on_changed(&runnable).await;
        }
        match self.manager.handle_runnable(&runnable).await {
            Ok(run) => debug!(run_id = %run.id, state = %run.state(), "Run updated from runnable"),
            Err(e) if e.is_not_found() => {
                warn!(runnable_id = %runnable.id, "No run owns this runnable");
            }
            Err(e) => {
                error!(
                    runnable_id = %runnable.id,
                    state = %runnable.state,
                    error = %e,
                    error_code = e.error_code(),
                    "Failed to apply runnable change to run"
                );
            }
        }
    }

    async fn dispatch(&self, runnable: Runnable) -> Result<()> {
        if !matches!(
            runnable.state,
            State::Ready | State::Stop | State::Resume | State::Deleting
        ) {
            debug!(runnable_id = %runnable.id, state = %runnable.state, "Nothing to dispatch");
            return Ok(());
        }

        let store = self.manager.stores().for_kind(&runnable.kind)?.clone();
        let framework = self.manager.frameworks().get(&runnable.kind)?;
        store.store(&runnable.id, &runnable).await?;

        let requested = runnable.state;
        let updated = match self.submit(framework.as_ref(), &runnable).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(
                    runnable_id = %runnable.id,
                    state = %requested,
                    error = %e,
                    "Framework call failed"
                );
                let mut failed = runnable;
                failed.fail(e.to_string());
                store.store(&failed.id, &failed).await?;
                self.manager.bus().changed(failed);
                return Ok(());
            }
        };

        info!(
            runnable_id = %updated.id,
            kind = %updated.kind,
            from = %requested,
            to = %updated.state,
            "Runnable dispatched"
        );
        if updated.state == State::Deleted {
            store.remove(&updated.id).await?;
        } else {
            store.store(&updated.id, &updated).await?;
        }
        self.manager.bus().changed(updated);
        Ok(())
    }

    async fn submit(&self, framework: &dyn Framework, runnable: &Runnable) -> Result<Runnable> {
        let mut attempt = 0;
        loop {
            let call = invoke(framework, runnable.clone());
            let result = match tokio::time::timeout(self.config.submit_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(CoreError::Timeout {
                    operation: format!("{} {}", runnable.state, runnable.id),
                    timeout: self.config.submit_timeout,
                }),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.submit_retries => {
                    attempt += 1;
                    let delay = self.config.retry_backoff * attempt;
                    warn!(
                        runnable_id = %runnable.id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Framework call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

async fn invoke(framework: &dyn Framework, runnable: Runnable) -> Result<Runnable> {
    match runnable.state {
        State::Stop => framework.stop(runnable).await,
        State::Resume => framework.resume(runnable).await,
        State::Deleting => framework.delete(runnable).await,
        _ => framework.run(runnable).await,
    }
}
