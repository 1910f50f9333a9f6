// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory runnable store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RunnableStore, check_kind};
use crate::error::{CoreError, Result};
use crate::model::Runnable;

/// Runnable store backed by a concurrent map. Contents are lost on restart.
pub struct InMemoryRunnableStore {
    kind: String,
    runnables: RwLock<HashMap<String, Runnable>>,
}

impl InMemoryRunnableStore {
    /// Create an empty store for `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            runnables: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored runnables.
    pub async fn len(&self) -> usize {
        self.runnables.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.runnables.read().await.is_empty()
    }
}

#[async_trait]
impl RunnableStore for InMemoryRunnableStore {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn find(&self, id: &str) -> Result<Runnable> {
        self.runnables
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("runnable", id))
    }

    async fn store(&self, id: &str, runnable: &Runnable) -> Result<()> {
        check_kind(self, runnable)?;
        self.runnables
            .write()
            .await
            .insert(id.to_string(), runnable.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.runnables.write().await.remove(id);
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<Runnable>> {
        let mut all: Vec<Runnable> = self.runnables.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}
