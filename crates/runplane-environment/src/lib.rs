// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runplane Environment - Execution Side of the Run Lifecycle
//!
//! This crate hosts everything that talks to an execution substrate on
//! behalf of `runplane-core`: the event processor handing produced
//! runnables to frameworks, the monitor reconciling running runnables, the
//! container runtime, and the process and mock frameworks.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        EngineRuntime                              │
//! │  ┌─────────────────────┐   EventBus   ┌────────────────────────┐  │
//! │  │ RunLifecycleManager │ ───────────► │     EventProcessor     │  │
//! │  │   (runplane-core)   │ ◄─────────── │  produced → framework  │  │
//! │  └─────────────────────┘   changed    └───────────┬────────────┘  │
//! │             ▲                                      │              │
//! │             │ changed                              ▼              │
//! │  ┌──────────┴──────────┐               ┌────────────────────────┐ │
//! │  │       Monitor       │ ◄──────────── │  RunnableStore (kind)  │ │
//! │  │  status → state     │               └────────────────────────┘ │
//! │  └──────────┬──────────┘                                          │
//! └─────────────┼─────────────────────────────────────────────────────┘
//!               ▼
//!      Framework::status ──► local processes / container CLI
//! ```
//!
//! # Container Runtime
//!
//! | Task | Runnable kind |
//! |------|---------------|
//! | `job` | `job` |
//! | `deploy` | `deployment` |
//! | `serve` | `service` |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `RUNPLANE_DATABASE_URL` | No | - | SQLite URL for runs and runnables (in-memory when unset) |
//! | `DATA_DIR` | No | `.data` | Data directory for process logs |
//! | `RUNPLANE_MONITOR_INTERVAL_SECS` | No | `10` | Monitor poll interval |
//! | `RUNPLANE_MONITOR_STALE_SECS` | No | - | Fail runnables without a terminal phase after this long |
//! | `RUNPLANE_SUBSTRATE_TIMEOUT_SECS` | No | `30` | Timeout for substrate calls |
//! | `RUNPLANE_CONTAINER_CLI` | No | - | `docker` or `podman`; native processes when unset |
//! | `RUNPLANE_MANIFEST` | No | - | JSON manifest submitted at start |
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for environment operations
//! - [`runtimes`]: Runtime implementations
//! - [`frameworks`]: Framework implementations
//! - [`processor`]: Event processor
//! - [`monitor`]: Reconciliation loop
//! - [`runtime`]: Embeddable runtime
//! - [`manifest`]: Manifest loading and submission

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for environment operations.
pub mod error;

/// Runtime implementations (container).
pub mod runtimes;

/// Framework implementations (process, mock).
pub mod frameworks;

/// Event processor dispatching runnables to frameworks.
pub mod processor;

/// Background worker reconciling running runnables.
pub mod monitor;

/// Embeddable runtime wiring the engine together.
pub mod runtime;

/// Manifest of definitions and runs.
pub mod manifest;

pub use error::{Error, Result};
pub use runtime::EngineRuntime;
