// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runplane Core - Run Lifecycle Engine
//!
//! This crate turns abstract run requests into executions on concrete
//! substrates. It owns the run state machine, the Runtime → Framework →
//! Runnable dispatch contracts, the runnable stores, and the lifecycle
//! manager tying them together.
//!
//! # Architecture
//!
//! ```text
//!   caller ──► RunLifecycleManager ──► run state machine
//!                    │                      │ transition logic
//!                    │                      ▼
//!                    │                   Runtime (build / run / stop / resume / delete)
//!                    │                      │ Runnable
//!                    ▼                      ▼
//!              RunRepository           EventBus ──► event processor ──► Framework
//!                                           ▲              │                │
//!                                           │              ▼                ▼
//!                                      "changed" ◄── RunnableStore      substrate
//!                                           ▲                               │
//!                                           └────────── Monitor ◄───────────┘
//! ```
//!
//! The event processor and the monitor live in `runplane-environment`.
//!
//! # Run State Machine
//!
//! ```text
//!   CREATED ──BUILD──► BUILT ──RUN──► READY ──EXECUTE──► RUNNING ──COMPLETE──► COMPLETED
//!                                       │                 │  ▲
//!                                    PENDING             STOP └─LOOP
//!                                       ▼                 ▼
//!                                    PENDING ──STOP──►  STOP ──STOP──► STOPPED ──RESUME──► RESUME
//!
//!   any non-terminal ──ERROR──► ERROR          any non-terminal ──DELETING──► DELETING ──DELETE──► DELETED
//! ```
//!
//! See [`lifecycle::run_fsm`] for the full table.
//!
//! # Modules
//!
//! - [`fsm`]: Generic state machine engine
//! - [`model`]: Runs, runnables, definitions and states
//! - [`dispatch`]: Runtime and framework contracts and registries
//! - [`store`]: Runnable stores (in-memory, SQLite) and the SQLite run repository
//! - [`events`]: In-process event bus
//! - [`lifecycle`]: Run state machine and lifecycle manager
//! - [`repository`]: Run, definition and credentials collaborators
//! - [`error`]: Error types

#![deny(missing_docs)]

/// Error types shared across the engine.
pub mod error;

/// Generic finite state machine.
pub mod fsm;

/// Domain model.
pub mod model;

/// Runtime and framework dispatch.
pub mod dispatch;

/// Runnable persistence.
pub mod store;

/// In-process event bus.
pub mod events;

/// Run lifecycle management.
pub mod lifecycle;

/// Collaborator contracts and in-memory implementations.
pub mod repository;

pub use error::{CoreError, Result};
pub use events::{EventBus, RunnableEvent};
pub use lifecycle::RunLifecycleManager;
