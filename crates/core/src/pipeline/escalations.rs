use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::draft::{DraftId, EscalationRecord};
use crate::pipeline::snapshot::{SnapshotError, SnapshotStore, ESCALATIONS_SNAPSHOT};

/// An owner reply only counts as an answer within this many days of the
/// escalation being sent; older records are pruned.
pub const MATCH_WINDOW_DAYS: i64 = 7;

/// Escalations that have been sent to the owner, keyed by the draft id they
/// were sent from. When the owner texts back, the newest unmatched record
/// within the window supplies the context for knowledge capture.
pub struct EscalationLog {
    entries: Mutex<HashMap<DraftId, EscalationRecord>>,
    store: Arc<dyn SnapshotStore>,
}

fn prune(entries: &mut HashMap<DraftId, EscalationRecord>) {
    let cutoff = Utc::now() - Duration::days(MATCH_WINDOW_DAYS);
    entries.retain(|_, record| !record.matched && record.sent_at >= cutoff);
}

impl EscalationLog {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), store }
    }

    pub async fn restore(store: Arc<dyn SnapshotStore>) -> Result<Self, SnapshotError> {
        let mut entries = match store.load(ESCALATIONS_SNAPSHOT).await? {
            Some(raw) => match serde_json::from_str::<HashMap<DraftId, EscalationRecord>>(&raw) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(
                        event_name = "pipeline.escalations.snapshot_corrupt",
                        %error,
                        "discarding unreadable escalation snapshot"
                    );
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };
        prune(&mut entries);
        Ok(Self { entries: Mutex::new(entries), store })
    }

    async fn persist(
        &self,
        entries: &HashMap<DraftId, EscalationRecord>,
    ) -> Result<(), SnapshotError> {
        let payload = serde_json::to_string(entries)
            .map_err(|error| SnapshotError::Encode(error.to_string()))?;
        self.store.save(ESCALATIONS_SNAPSHOT, &payload).await
    }

    pub async fn record_sent(
        &self,
        id: DraftId,
        context: String,
    ) -> Result<(), SnapshotError> {
        let mut entries = self.entries.lock().await;
        entries.insert(id, EscalationRecord { context, sent_at: Utc::now(), matched: false });
        self.persist(&entries).await
    }

    /// The escalation an owner reply most plausibly answers: newest unmatched
    /// record inside the match window.
    pub async fn most_recent_unmatched(&self) -> Option<(DraftId, EscalationRecord)> {
        let entries = self.entries.lock().await;
        let cutoff = Utc::now() - Duration::days(MATCH_WINDOW_DAYS);
        entries
            .iter()
            .filter(|(_, record)| !record.matched && record.sent_at >= cutoff)
            .max_by_key(|(_, record)| record.sent_at)
            .map(|(id, record)| (id.clone(), record.clone()))
    }

    pub async fn mark_matched(&self, id: &DraftId) -> Result<bool, SnapshotError> {
        let mut entries = self.entries.lock().await;
        let Some(record) = entries.get_mut(id) else { return Ok(false) };
        record.matched = true;
        prune(&mut entries);
        self.persist(&entries).await?;
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
