mod booking;
mod client;
mod memory;
mod message;
mod schedule;
mod snapshot;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

use barkline_core::domain::{
    Booking, Client, ClientId, ClientStats, ConversationLine, Groomer, GroomerId, InboundMessage,
    MessageId, NoteEntry, Pet, PetId, ServiceKind,
};

pub use booking::SqlBookingRepository;
pub use client::SqlClientRepository;
pub use memory::{
    InMemoryBookingRepository, InMemoryClientRepository, InMemoryMessageRepository,
    InMemoryScheduleRepository,
};
pub use message::SqlMessageRepository;
pub use schedule::SqlScheduleRepository;
pub use snapshot::SqlSnapshotStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
}

/// Mirror of the point-of-sale message store. Inbound rows are appended by
/// the sync job; the pipeline only reads, marks handled, and appends the
/// assistant's own outbound replies.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn max_message_id(&self) -> Result<Option<MessageId>, RepositoryError>;
    /// Inbound, unhandled messages strictly above the watermark, oldest
    /// first, capped at `limit`.
    async fn unhandled_after(
        &self,
        after: MessageId,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, RepositoryError>;
    async fn mark_handled(&self, id: MessageId) -> Result<bool, RepositoryError>;
    /// The last `limit` messages with a client, oldest first.
    async fn conversation_tail(
        &self,
        client_id: ClientId,
        limit: u32,
    ) -> Result<Vec<ConversationLine>, RepositoryError>;
    async fn record_assistant_reply(
        &self,
        client_id: Option<ClientId>,
        phone: &str,
        body: &str,
    ) -> Result<MessageId, RepositoryError>;
}

/// One row of appointment history or upcoming schedule, joined with names
/// for display.
#[derive(Clone, Debug)]
pub struct AppointmentRow {
    pub date: NaiveDate,
    pub start_min: u16,
    pub pet_id: PetId,
    pub pet_name: String,
    pub groomer_id: GroomerId,
    pub groomer_name: String,
    pub service: ServiceKind,
}

#[derive(Clone, Debug)]
pub struct NewBooking {
    pub groomer_id: GroomerId,
    pub pet_id: PetId,
    pub date: NaiveDate,
    pub start_min: u16,
    pub end_min: Option<u16>,
    pub service: ServiceKind,
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Live (non-deleted, non-waitlist) bookings for one groomer in a date
    /// range, joined with pet and client detail for the engine.
    async fn for_groomer_between(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError>;
    async fn upcoming_for_client(
        &self,
        client_id: ClientId,
        from: NaiveDate,
        limit: u32,
    ) -> Result<Vec<AppointmentRow>, RepositoryError>;
    async fn future_count(
        &self,
        client_id: ClientId,
        from: NaiveDate,
    ) -> Result<i64, RepositoryError>;
    async fn history_for_client(
        &self,
        client_id: ClientId,
        before: NaiveDate,
        limit: u32,
    ) -> Result<Vec<AppointmentRow>, RepositoryError>;
    async fn insert(&self, booking: &NewBooking) -> Result<i64, RepositoryError>;
}

/// Calendar facts: who grooms, when the salon is closed, and which days each
/// groomer works.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn active_groomers(&self) -> Result<Vec<Groomer>, RepositoryError>;
    async fn closures_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError>;
    async fn blocked_between(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError>;
    /// Concrete working dates expanded from the weekly schedule grid. A NULL
    /// day column means not scheduled that day.
    async fn working_days(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find(&self, id: ClientId) -> Result<Option<Client>, RepositoryError>;
    /// Match on normalized digits, since the point-of-sale stores phones in
    /// assorted formats.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Client>, RepositoryError>;
    /// Fuzzy lookup by client name, falling back to pet name.
    async fn search(&self, query: &str) -> Result<Option<Client>, RepositoryError>;
    async fn pets_for(&self, id: ClientId) -> Result<Vec<Pet>, RepositoryError>;
    async fn notes_for(
        &self,
        id: ClientId,
        limit: u32,
    ) -> Result<Vec<NoteEntry>, RepositoryError>;
    async fn stats_for(&self, id: ClientId) -> Result<Option<ClientStats>, RepositoryError>;
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| RepositoryError::Decode(format!("invalid date `{raw}`")))
}

/// Timestamps arrive either as RFC 3339 (written by this service) or as
/// sqlite's `datetime('now')` format (written by seeds and the sync job).
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| RepositoryError::Decode(format!("invalid timestamp `{raw}`")))
}

pub(crate) fn decode_minutes(value: i64, column: &str) -> Result<u16, RepositoryError> {
    u16::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("column `{column}` out of range: {value}")))
}
