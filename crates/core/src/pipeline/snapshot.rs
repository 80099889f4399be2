use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

pub const DRAFTS_SNAPSHOT: &str = "drafts";
pub const ESCALATIONS_SNAPSHOT: &str = "escalations";
pub const WATERMARK_SNAPSHOT: &str = "inbound_watermark";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot storage failure: {0}")]
    Storage(String),
    #[error("snapshot payload could not be encoded: {0}")]
    Encode(String),
}

/// Durable storage for pipeline state documents. Each named document is a
/// small JSON payload replaced wholesale on save; mutations persist before
/// they are acknowledged, so a restart restores the reviewer's world.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<String>, SnapshotError>;
    async fn save(&self, name: &str, payload: &str) -> Result<(), SnapshotError>;
}

/// Map-backed store for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, name: &str) -> Result<Option<String>, SnapshotError> {
        Ok(self.entries.lock().await.get(name).cloned())
    }

    async fn save(&self, name: &str, payload: &str) -> Result<(), SnapshotError> {
        self.entries.lock().await.insert(name.to_string(), payload.to_string());
        Ok(())
    }
}
