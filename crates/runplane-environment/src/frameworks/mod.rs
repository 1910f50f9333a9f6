// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Framework implementations.
//!
//! - [`ProcessFramework`]: local child processes, optionally through a
//!   container CLI
//! - [`MockFramework`]: scriptable in-memory substrate for tests

pub mod mock;
pub mod process;

pub use mock::{MockCall, MockFramework};
pub use process::{ProcessFramework, ProcessFrameworkConfig};
