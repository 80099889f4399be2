pub mod drafts;
pub mod escalations;
pub mod intent;
pub mod snapshot;
pub mod watermark;

pub use drafts::DraftQueue;
pub use escalations::{EscalationLog, MATCH_WINDOW_DAYS};
pub use intent::mentions_scheduling;
pub use snapshot::{
    InMemorySnapshotStore, SnapshotError, SnapshotStore, DRAFTS_SNAPSHOT, ESCALATIONS_SNAPSHOT,
    WATERMARK_SNAPSHOT,
};
pub use watermark::Watermark;
