// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run lifecycle: the run state machine and the manager applying it.

mod manager;
mod run_fsm;

pub use manager::{DefaultEffect, RunEffect, RunLifecycleManager};
pub use run_fsm::{RunContext, RunFsm, RunInput, RunTransitionOutput, run_fsm};
