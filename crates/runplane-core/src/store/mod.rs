// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runnable stores - keyed persistence of in-flight runnables.
//!
//! There is one store per runnable kind. [`RunnableStores`] is the
//! registration table holding all of them and implements the cross-store
//! fan-out used to locate a runnable when only its ID is known.

mod memory;
mod sqlite;

pub use memory::InMemoryRunnableStore;
pub use sqlite::{SqliteRunRepository, SqliteRunnableStore, connect_sqlite, migrate_sqlite};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CoreError, Result};
use crate::model::Runnable;

/// Persistence for the runnables of one kind.
///
/// Implementations must be safe for concurrent access. `store` is an upsert
/// with last-writer-wins semantics and `remove` of a missing ID succeeds.
#[async_trait]
pub trait RunnableStore: Send + Sync {
    /// Runnable kind held by this store.
    fn kind(&self) -> &str;

    /// Load a runnable, [`CoreError::NotFound`] when absent.
    async fn find(&self, id: &str) -> Result<Runnable>;

    /// Insert or replace the runnable stored under `id`.
    async fn store(&self, id: &str, runnable: &Runnable) -> Result<()>;

    /// Remove the runnable stored under `id`.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Every stored runnable.
    async fn find_all(&self) -> Result<Vec<Runnable>>;
}

pub(crate) fn check_kind(store: &dyn RunnableStore, runnable: &Runnable) -> Result<()> {
    if runnable.kind != store.kind() {
        return Err(CoreError::KindMismatch {
            expected: store.kind().to_string(),
            actual: runnable.kind.clone(),
        });
    }
    Ok(())
}

/// Registration table of runnable stores, keyed by runnable kind.
#[derive(Clone, Default)]
pub struct RunnableStores {
    order: Vec<String>,
    stores: HashMap<String, Arc<dyn RunnableStore>>,
}

impl RunnableStores {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store. Fails if its kind is already taken.
    pub fn register(&mut self, store: Arc<dyn RunnableStore>) -> Result<()> {
        let kind = store.kind().to_string();
        if self.stores.contains_key(&kind) {
            return Err(CoreError::Registration(format!(
                "runnable store for kind '{}' registered twice",
                kind
            )));
        }
        self.order.push(kind.clone());
        self.stores.insert(kind, store);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, store: Arc<dyn RunnableStore>) -> Result<Self> {
        self.register(store)?;
        Ok(self)
    }

    /// Store for `kind`, if registered.
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn RunnableStore>> {
        self.stores.get(kind)
    }

    /// Store for `kind`, or a registration error.
    pub fn for_kind(&self, kind: &str) -> Result<&Arc<dyn RunnableStore>> {
        self.get(kind).ok_or_else(|| {
            CoreError::Registration(format!("no runnable store registered for kind '{}'", kind))
        })
    }

    /// Whether a store is registered for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.stores.contains_key(kind)
    }

    /// Registered stores in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RunnableStore>> {
        self.order.iter().filter_map(|kind| self.stores.get(kind))
    }

    /// Search every store for a runnable with `id` accepted by `matches`.
    ///
    /// Stores are searched in registration order and the first match wins.
    /// A failing store is skipped so one broken backend does not hide
    /// runnables held by the others.
    pub async fn locate(
        &self,
        id: &str,
        matches: impl Fn(&Runnable) -> bool,
    ) -> Result<Runnable> {
        for store in self.iter() {
            match store.find(id).await {
                Ok(runnable) if matches(&runnable) => return Ok(runnable),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(
                        kind = %store.kind(),
                        runnable_id = %id,
                        error = %e,
                        "Runnable store lookup failed"
                    );
                }
            }
        }
        Err(CoreError::not_found("runnable", id))
    }
}
