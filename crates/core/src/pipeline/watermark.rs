use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::pipeline::snapshot::{SnapshotError, SnapshotStore, WATERMARK_SNAPSHOT};

/// Sentinel meaning "never primed": the poller must observe the current
/// message high-water mark before it is allowed to draft anything.
const UNPRIMED: i64 = -1;

#[derive(Debug, Serialize, Deserialize)]
struct WatermarkSnapshot {
    last_seen_id: i64,
}

/// High-water mark over inbound message ids. Only messages above the mark are
/// considered by a poll cycle, and the mark only moves forward, so a message
/// is drafted at most once no matter how many cycles see it.
pub struct Watermark {
    value: AtomicI64,
}

impl Watermark {
    pub fn new(initial: i64) -> Self {
        Self { value: AtomicI64::new(initial) }
    }

    pub fn unprimed() -> Self {
        Self::new(UNPRIMED)
    }

    /// Load the stored mark, if any. `None` means this is a first run and the
    /// poller should prime without drafting.
    pub async fn restore(store: &dyn SnapshotStore) -> Result<Option<i64>, SnapshotError> {
        let Some(raw) = store.load(WATERMARK_SNAPSHOT).await? else { return Ok(None) };
        match serde_json::from_str::<WatermarkSnapshot>(&raw) {
            Ok(snapshot) => Ok(Some(snapshot.last_seen_id)),
            Err(_) => Ok(None),
        }
    }

    pub fn is_primed(&self) -> bool {
        self.value.load(Ordering::SeqCst) != UNPRIMED
    }

    pub fn load(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// First-run initialization: adopt the current high-water mark so the
    /// backlog is never drafted.
    pub fn prime(&self, id: i64) {
        self.value.store(id.max(0), Ordering::SeqCst);
    }

    /// Move the mark forward; backwards movement is ignored.
    pub fn advance_to(&self, id: i64) {
        self.value.fetch_max(id, Ordering::SeqCst);
    }

    pub async fn persist(&self, store: &dyn SnapshotStore) -> Result<(), SnapshotError> {
        let snapshot = WatermarkSnapshot { last_seen_id: self.load() };
        let payload = serde_json::to_string(&snapshot)
            .map_err(|error| SnapshotError::Encode(error.to_string()))?;
        store.save(WATERMARK_SNAPSHOT, &payload).await
    }
}
