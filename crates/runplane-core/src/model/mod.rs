// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model: runs, runnables, upstream definitions and lifecycle states.

mod definition;
mod run;
mod runnable;
mod state;

pub use definition::*;
pub use run::*;
pub use runnable::*;
pub use state::*;
