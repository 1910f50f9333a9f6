// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime implementations.

pub mod container;

pub use container::{CONTAINER_KIND, ContainerRuntime, ContainerTask};
