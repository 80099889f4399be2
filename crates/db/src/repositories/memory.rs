//! In-memory repository implementations for exercising pipeline and engine
//! code without a database. Seed them through the `push_*`/`add_*` helpers.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use barkline_core::domain::{
    normalize_phone, Booking, Client, ClientId, ClientStats, ConversationLine, Groomer,
    GroomerId, InboundMessage, MessageId, NoteEntry, Pet,
};

use crate::repositories::{
    AppointmentRow, BookingRepository, ClientRepository, MessageRepository, NewBooking,
    RepositoryError, ScheduleRepository,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn injected_failure() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolClosed)
}

struct StoredMessage {
    message: InboundMessage,
    outbound: bool,
    handled: bool,
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    rows: Mutex<Vec<StoredMessage>>,
    next_id: AtomicI64,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self { rows: Mutex::new(Vec::new()), next_id: AtomicI64::new(1) }
    }

    pub fn push_inbound(
        &self,
        client_id: Option<ClientId>,
        phone: &str,
        body: &str,
    ) -> MessageId {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.rows).push(StoredMessage {
            message: InboundMessage {
                id,
                client_id,
                phone: phone.to_string(),
                body: body.to_string(),
                received_at: Utc::now(),
            },
            outbound: false,
            handled: false,
        });
        id
    }

    pub fn is_handled(&self, id: MessageId) -> bool {
        lock(&self.rows).iter().any(|row| row.message.id == id && row.handled)
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn max_message_id(&self) -> Result<Option<MessageId>, RepositoryError> {
        Ok(lock(&self.rows).iter().map(|row| row.message.id).max())
    }

    async fn unhandled_after(
        &self,
        after: MessageId,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, RepositoryError> {
        let rows = lock(&self.rows);
        let mut batch: Vec<InboundMessage> = rows
            .iter()
            .filter(|row| !row.outbound && !row.handled && row.message.id > after)
            .map(|row| row.message.clone())
            .collect();
        batch.sort_by_key(|message| message.id);
        batch.truncate(limit as usize);
        Ok(batch)
    }

    async fn mark_handled(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let mut rows = lock(&self.rows);
        for row in rows.iter_mut() {
            if row.message.id == id {
                row.handled = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn conversation_tail(
        &self,
        client_id: ClientId,
        limit: u32,
    ) -> Result<Vec<ConversationLine>, RepositoryError> {
        let rows = lock(&self.rows);
        let mut lines: Vec<ConversationLine> = rows
            .iter()
            .filter(|row| row.message.client_id == Some(client_id))
            .map(|row| ConversationLine {
                from_business: row.outbound,
                body: row.message.body.clone(),
            })
            .collect();
        let keep = limit as usize;
        if lines.len() > keep {
            lines.drain(..lines.len() - keep);
        }
        Ok(lines)
    }

    async fn record_assistant_reply(
        &self,
        client_id: Option<ClientId>,
        phone: &str,
        body: &str,
    ) -> Result<MessageId, RepositoryError> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.rows).push(StoredMessage {
            message: InboundMessage {
                id,
                client_id,
                phone: phone.to_string(),
                body: body.to_string(),
                received_at: Utc::now(),
            },
            outbound: true,
            handled: true,
        });
        Ok(id)
    }
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: Mutex<Vec<(GroomerId, Booking)>>,
    appointments: Mutex<Vec<(ClientId, AppointmentRow)>>,
    inserted: Mutex<Vec<NewBooking>>,
    next_id: AtomicI64,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self {
            bookings: Mutex::new(Vec::new()),
            appointments: Mutex::new(Vec::new()),
            inserted: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn push_booking(&self, booking: Booking) {
        lock(&self.bookings).push((booking.groomer_id, booking));
    }

    pub fn push_appointment(&self, client_id: ClientId, row: AppointmentRow) {
        lock(&self.appointments).push((client_id, row));
    }

    /// Bookings accepted through `insert`, in arrival order.
    pub fn inserted(&self) -> Vec<NewBooking> {
        lock(&self.inserted).clone()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn for_groomer_between(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError> {
        Ok(lock(&self.bookings)
            .iter()
            .filter(|(owner, booking)| {
                *owner == groomer_id && booking.date >= start && booking.date <= end
            })
            .map(|(_, booking)| booking.clone())
            .collect())
    }

    async fn upcoming_for_client(
        &self,
        client_id: ClientId,
        from: NaiveDate,
        limit: u32,
    ) -> Result<Vec<AppointmentRow>, RepositoryError> {
        let mut rows: Vec<AppointmentRow> = lock(&self.appointments)
            .iter()
            .filter(|(owner, row)| *owner == client_id && row.date >= from)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by_key(|row| (row.date, row.start_min));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn future_count(
        &self,
        client_id: ClientId,
        from: NaiveDate,
    ) -> Result<i64, RepositoryError> {
        Ok(lock(&self.appointments)
            .iter()
            .filter(|(owner, row)| *owner == client_id && row.date >= from)
            .count() as i64)
    }

    async fn history_for_client(
        &self,
        client_id: ClientId,
        before: NaiveDate,
        limit: u32,
    ) -> Result<Vec<AppointmentRow>, RepositoryError> {
        let mut rows: Vec<AppointmentRow> = lock(&self.appointments)
            .iter()
            .filter(|(owner, row)| *owner == client_id && row.date < before)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| (b.date, b.start_min).cmp(&(a.date, a.start_min)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn insert(&self, booking: &NewBooking) -> Result<i64, RepositoryError> {
        lock(&self.inserted).push(booking.clone());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    groomers: Mutex<Vec<Groomer>>,
    closures: Mutex<Vec<NaiveDate>>,
    blocked: Mutex<Vec<(GroomerId, NaiveDate)>>,
    working: Mutex<Vec<(GroomerId, NaiveDate)>>,
    fail_facts: AtomicBool,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_groomer(&self, id: GroomerId, name: &str, note: Option<&str>) {
        lock(&self.groomers).push(Groomer {
            id,
            name: name.to_string(),
            note: note.map(str::to_string),
        });
    }

    pub fn add_closure(&self, date: NaiveDate) {
        lock(&self.closures).push(date);
    }

    pub fn add_blocked(&self, groomer_id: GroomerId, date: NaiveDate) {
        lock(&self.blocked).push((groomer_id, date));
    }

    pub fn add_working(&self, groomer_id: GroomerId, date: NaiveDate) {
        lock(&self.working).push((groomer_id, date));
    }

    pub fn add_working_range(&self, groomer_id: GroomerId, start: NaiveDate, end: NaiveDate) {
        let mut day = start;
        while day <= end {
            lock(&self.working).push((groomer_id, day));
            day += chrono::Duration::days(1);
        }
    }

    /// When set, the three fact queries fail as if the database were
    /// unreachable.
    pub fn set_fail_facts(&self, fail: bool) {
        self.fail_facts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn active_groomers(&self) -> Result<Vec<Groomer>, RepositoryError> {
        Ok(lock(&self.groomers).clone())
    }

    async fn closures_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        if self.fail_facts.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(lock(&self.closures)
            .iter()
            .copied()
            .filter(|date| *date >= start && *date <= end)
            .collect())
    }

    async fn blocked_between(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        if self.fail_facts.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(lock(&self.blocked)
            .iter()
            .filter(|(owner, date)| *owner == groomer_id && *date >= start && *date <= end)
            .map(|(_, date)| *date)
            .collect())
    }

    async fn working_days(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        if self.fail_facts.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        let mut days: Vec<NaiveDate> = lock(&self.working)
            .iter()
            .filter(|(owner, date)| *owner == groomer_id && *date >= start && *date <= end)
            .map(|(_, date)| *date)
            .collect();
        days.sort();
        Ok(days)
    }
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: Mutex<Vec<Client>>,
    pets: Mutex<Vec<Pet>>,
    notes: Mutex<Vec<(ClientId, NoteEntry)>>,
    stats: Mutex<Vec<ClientStats>>,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, client: Client) {
        lock(&self.clients).push(client);
    }

    pub fn add_pet(&self, pet: Pet) {
        lock(&self.pets).push(pet);
    }

    pub fn add_note(&self, client_id: ClientId, note: NoteEntry) {
        lock(&self.notes).push((client_id, note));
    }

    pub fn add_stats(&self, stats: ClientStats) {
        lock(&self.stats).push(stats);
    }
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn find(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        Ok(lock(&self.clients).iter().find(|client| client.id == id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Client>, RepositoryError> {
        let target = normalize_phone(phone);
        if target.is_empty() {
            return Ok(None);
        }
        Ok(lock(&self.clients)
            .iter()
            .find(|client| normalize_phone(&client.phone) == target)
            .cloned())
    }

    async fn search(&self, query: &str) -> Result<Option<Client>, RepositoryError> {
        let needle = query.trim().to_lowercase();
        let clients = lock(&self.clients);
        if let Some(client) = clients
            .iter()
            .find(|client| client.full_name().to_lowercase().contains(&needle))
        {
            return Ok(Some(client.clone()));
        }
        let pets = lock(&self.pets);
        let by_pet = pets.iter().find(|pet| pet.name.to_lowercase().contains(&needle));
        Ok(by_pet.and_then(|pet| {
            clients.iter().find(|client| client.id == pet.client_id).cloned()
        }))
    }

    async fn pets_for(&self, id: ClientId) -> Result<Vec<Pet>, RepositoryError> {
        Ok(lock(&self.pets).iter().filter(|pet| pet.client_id == id).cloned().collect())
    }

    async fn notes_for(
        &self,
        id: ClientId,
        limit: u32,
    ) -> Result<Vec<NoteEntry>, RepositoryError> {
        let mut notes: Vec<NoteEntry> = lock(&self.notes)
            .iter()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, note)| note.clone())
            .collect();
        notes.sort_by(|a, b| b.noted_on.cmp(&a.noted_on));
        notes.truncate(limit as usize);
        Ok(notes)
    }

    async fn stats_for(&self, id: ClientId) -> Result<Option<ClientStats>, RepositoryError> {
        Ok(lock(&self.stats).iter().find(|stats| stats.client_id == id).cloned())
    }
}
