use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use barkline_core::pipeline::{SnapshotError, SnapshotStore};

use crate::DbPool;

/// Snapshot store over the `pipeline_snapshots` table. Each named document is
/// replaced wholesale with an upsert, so the newest payload always wins.
pub struct SqlSnapshotStore {
    pool: DbPool,
}

impl SqlSnapshotStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for SqlSnapshotStore {
    async fn load(&self, name: &str) -> Result<Option<String>, SnapshotError> {
        let row = sqlx::query("SELECT payload FROM pipeline_snapshots WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| SnapshotError::Storage(error.to_string()))?;
        Ok(row.map(|row| row.get::<String, _>("payload")))
    }

    async fn save(&self, name: &str, payload: &str) -> Result<(), SnapshotError> {
        sqlx::query(
            "INSERT INTO pipeline_snapshots (name, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET payload = excluded.payload,
                                             updated_at = excluded.updated_at",
        )
        .bind(name)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| SnapshotError::Storage(error.to_string()))?;
        Ok(())
    }
}
