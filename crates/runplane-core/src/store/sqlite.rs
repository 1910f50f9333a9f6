// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed runnable store and run repository.
//!
//! All kinds share one `runnables` table keyed by `(kind, id)`. The runnable
//! itself is kept as a JSON body; `state` and `updated_at` are duplicated into
//! columns for inspection. Runs live in the `runs` table the same way.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::{RunnableStore, check_kind};
use crate::error::{CoreError, Result};
use crate::model::{Run, Runnable};
use crate::repository::RunRepository;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Run the runnable store and run repository migrations on `pool`.
pub async fn migrate_sqlite(pool: &SqlitePool) -> Result<()> {
    MIGRATOR.run(pool).await.map_err(|e| CoreError::Store {
        operation: "migrate",
        details: format!("Failed to run migrations: {}", e),
    })
}

/// Connect to a SQLite URL and run migrations.
///
/// File URLs get `mode=rwc` appended when no mode is given and the parent
/// directory is created if needed.
pub async fn connect_sqlite(url: &str) -> Result<SqlitePool> {
    let url = if url.contains(":memory:") || url.contains("mode=") {
        url.to_string()
    } else {
        let path = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Store {
                operation: "create_dir",
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }
        format!("sqlite:{}?mode=rwc", path)
    };

    // An in-memory database lives only as long as its connection.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .map_err(|e| CoreError::Store {
            operation: "connect",
            details: format!("Failed to connect to SQLite at {}: {}", url, e),
        })?;

    migrate_sqlite(&pool).await?;
    Ok(pool)
}

/// Runnable store persisting one kind into SQLite.
#[derive(Clone)]
pub struct SqliteRunnableStore {
    pool: SqlitePool,
    kind: String,
}

impl SqliteRunnableStore {
    /// Store for `kind` on an already migrated pool.
    pub fn new(pool: SqlitePool, kind: impl Into<String>) -> Self {
        Self {
            pool,
            kind: kind.into(),
        }
    }
}

#[async_trait]
impl RunnableStore for SqliteRunnableStore {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn find(&self, id: &str) -> Result<Runnable> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT body
            FROM runnables
            WHERE kind = ? AND id = ?
            "#,
        )
        .bind(&self.kind)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (body,) = row.ok_or_else(|| CoreError::not_found("runnable", id))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn store(&self, id: &str, runnable: &Runnable) -> Result<()> {
        check_kind(self, runnable)?;
        let body = serde_json::to_string(runnable)?;

        sqlx::query(
            r#"
            INSERT INTO runnables (kind, id, state, body, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (kind, id) DO UPDATE
            SET state = excluded.state,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.kind)
        .bind(id)
        .bind(runnable.state.as_str())
        .bind(body)
        .bind(runnable.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM runnables WHERE kind = ? AND id = ?")
            .bind(&self.kind)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<Runnable>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT body
            FROM runnables
            WHERE kind = ?
            ORDER BY id
            "#,
        )
        .bind(&self.kind)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(body,)| serde_json::from_str(&body).map_err(CoreError::from))
            .collect()
    }
}

/// Run repository persisting into SQLite.
#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    /// Repository on an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn find(&self, id: &str) -> Result<Run> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let (body,) = row.ok_or_else(|| CoreError::not_found("run", id))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn save(&self, run: &Run) -> Result<()> {
        let mut run = run.clone();
        run.updated_at = Utc::now();
        let body = serde_json::to_string(&run)?;

        sqlx::query(
            r#"
            INSERT INTO runs (id, project, state, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE
            SET state = excluded.state,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&run.id)
        .bind(&run.project)
        .bind(run.state().as_str())
        .bind(body)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, project: &str) -> Result<Vec<Run>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT body
            FROM runs
            WHERE project = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(body,)| serde_json::from_str(&body).map_err(CoreError::from))
            .collect()
    }
}
