// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process event bus carrying runnables between the lifecycle manager,
//! the event processor and the monitor.
//!
//! Publishing is fire-and-forget on an unbounded channel. There is a single
//! consumer, so events are observed in publish order.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::model::Runnable;

/// Event published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnableEvent {
    /// A transition produced a runnable that must be handed to its framework.
    Produced(Runnable),
    /// A framework or the monitor changed a runnable's state.
    Changed(Runnable),
}

impl RunnableEvent {
    /// The carried runnable.
    pub fn runnable(&self) -> &Runnable {
        match self {
            RunnableEvent::Produced(runnable) | RunnableEvent::Changed(runnable) => runnable,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            RunnableEvent::Produced(_) => "produced",
            RunnableEvent::Changed(_) => "changed",
        }
    }
}

/// Publishing side of the bus. Cheap to clone.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<RunnableEvent>,
}

/// Consuming side of the bus.
pub type EventReceiver = mpsc::UnboundedReceiver<RunnableEvent>;

impl EventBus {
    /// Create a bus and its single receiver.
    pub fn channel() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Publish an event. A closed bus drops it with a warning.
    pub fn publish(&self, event: RunnableEvent) {
        if let Err(e) = self.sender.send(event) {
            let event = e.0;
            warn!(
                runnable_id = %event.runnable().id,
                event = event.name(),
                "Event bus closed, dropping event"
            );
        }
    }

    /// Publish [`RunnableEvent::Produced`].
    pub fn produced(&self, runnable: Runnable) {
        self.publish(RunnableEvent::Produced(runnable));
    }

    /// Publish [`RunnableEvent::Changed`].
    pub fn changed(&self, runnable: Runnable) {
        self.publish(RunnableEvent::Changed(runnable));
    }
}

/// Observer of runnable changes, notified before the lifecycle manager.
#[async_trait]
pub trait RunnableListener: Send + Sync {
    /// Called for every "changed" event.
    async fn on_changed(&self, runnable: &Runnable);
}
