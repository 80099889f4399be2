use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::draft::{Draft, DraftId};
use crate::domain::message::MessageId;
use crate::pipeline::snapshot::{SnapshotError, SnapshotStore, DRAFTS_SNAPSHOT};

/// The review queue: every pending draft keyed by id, persisted as one JSON
/// document after each mutation.
///
/// All mutations run under a single async lock and persist before the lock is
/// released, so concurrent reviewer actions on the same draft resolve to
/// exactly one winner and the stored snapshot never goes backwards in time
/// relative to what a caller observed.
///
/// A draft mid-delivery is held as a claim: out of the review queue, but
/// still visible to [`DraftQueue::pending_escalation`] and
/// [`DraftQueue::contains_message`] until the claim resolves.
pub struct DraftQueue {
    state: Mutex<QueueState>,
    store: Arc<dyn SnapshotStore>,
}

#[derive(Default)]
struct QueueState {
    drafts: HashMap<DraftId, Draft>,
    in_flight: HashMap<DraftId, Draft>,
}

impl DraftQueue {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { state: Mutex::new(QueueState::default()), store }
    }

    /// Rebuild the queue from the stored snapshot. A corrupt payload is
    /// logged and treated as empty rather than blocking startup.
    pub async fn restore(store: Arc<dyn SnapshotStore>) -> Result<Self, SnapshotError> {
        let drafts = match store.load(DRAFTS_SNAPSHOT).await? {
            Some(raw) => match serde_json::from_str::<HashMap<DraftId, Draft>>(&raw) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(
                        event_name = "pipeline.drafts.snapshot_corrupt",
                        %error,
                        "discarding unreadable draft snapshot"
                    );
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };
        Ok(Self {
            state: Mutex::new(QueueState { drafts, in_flight: HashMap::new() }),
            store,
        })
    }

    async fn persist(&self, drafts: &HashMap<DraftId, Draft>) -> Result<(), SnapshotError> {
        let payload = serde_json::to_string(drafts)
            .map_err(|error| SnapshotError::Encode(error.to_string()))?;
        self.store.save(DRAFTS_SNAPSHOT, &payload).await
    }

    /// Insert a draft unless one with the same id already exists or is mid
    /// delivery. Returns whether the draft was added.
    pub async fn insert(&self, draft: Draft) -> Result<bool, SnapshotError> {
        let mut state = self.state.lock().await;
        if state.drafts.contains_key(&draft.draft_id)
            || state.in_flight.contains_key(&draft.draft_id)
        {
            return Ok(false);
        }
        state.drafts.insert(draft.draft_id.clone(), draft);
        self.persist(&state.drafts).await?;
        Ok(true)
    }

    pub async fn contains_message(&self, id: MessageId) -> bool {
        let state = self.state.lock().await;
        state
            .drafts
            .values()
            .chain(state.in_flight.values())
            .any(|draft| draft.message_id == Some(id))
    }

    pub async fn get(&self, id: &DraftId) -> Option<Draft> {
        self.state.lock().await.drafts.get(id).cloned()
    }

    /// Pending drafts, oldest first.
    pub async fn list(&self) -> Vec<Draft> {
        let state = self.state.lock().await;
        let mut all: Vec<Draft> = state.drafts.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    /// Remove a draft. At most one concurrent caller gets the draft back;
    /// everyone else sees `None`.
    pub async fn remove(&self, id: &DraftId) -> Result<Option<Draft>, SnapshotError> {
        let mut state = self.state.lock().await;
        let removed = state.drafts.remove(id);
        if removed.is_some() {
            self.persist(&state.drafts).await?;
        }
        Ok(removed)
    }

    /// Replace the text of a pending draft, keeping its identity and
    /// metadata. Returns the updated draft, or `None` if no draft with the
    /// given id is queued.
    pub async fn replace_text(
        &self,
        id: &DraftId,
        text: String,
    ) -> Result<Option<Draft>, SnapshotError> {
        let mut state = self.state.lock().await;
        let Some(draft) = state.drafts.get_mut(id) else { return Ok(None) };
        draft.draft = text;
        let updated = draft.clone();
        self.persist(&state.drafts).await?;
        Ok(Some(updated))
    }

    /// Claim a draft for delivery. The draft leaves the review queue like
    /// [`DraftQueue::remove`], but keeps counting as a pending escalation
    /// until the claim resolves, so a send in flight still blocks duplicate
    /// escalations. At most one concurrent caller gets the draft back.
    pub async fn claim(&self, id: &DraftId) -> Result<Option<Draft>, SnapshotError> {
        let mut state = self.state.lock().await;
        let Some(draft) = state.drafts.remove(id) else { return Ok(None) };
        state.in_flight.insert(draft.draft_id.clone(), draft.clone());
        self.persist(&state.drafts).await?;
        Ok(Some(draft))
    }

    /// Put a claimed draft back in the review queue after a failed delivery.
    pub async fn release_claim(&self, draft: Draft) -> Result<(), SnapshotError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&draft.draft_id);
        state.drafts.insert(draft.draft_id.clone(), draft);
        self.persist(&state.drafts).await
    }

    /// Resolve a claim after a successful delivery.
    pub async fn discard_claim(&self, id: &DraftId) {
        self.state.lock().await.in_flight.remove(id);
    }

    /// Any escalation still unsent, queued or mid delivery. Used to avoid
    /// stacking duplicate questions for the owner.
    pub async fn pending_escalation(&self) -> Option<Draft> {
        let state = self.state.lock().await;
        state
            .drafts
            .values()
            .chain(state.in_flight.values())
            .find(|draft| draft.is_escalation)
            .cloned()
    }

    /// Highest inbound message id among pending drafts. On restart this
    /// floors the watermark so restored drafts are never re-drafted.
    pub async fn max_message_id(&self) -> Option<MessageId> {
        let state = self.state.lock().await;
        state
            .drafts
            .values()
            .chain(state.in_flight.values())
            .filter_map(|draft| draft.message_id)
            .max()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.drafts.len()
    }
}
