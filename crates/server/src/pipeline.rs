//! Orchestrates the whole draft lifecycle: polling inbound messages into
//! drafts, routing owner replies into the knowledge base, and the reviewer
//! operations that send, edit, or dismiss what is queued.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::Serialize;
use tokio::time::Duration as Ttl;
use tracing::{info, warn};

use barkline_agent::{
    judgment_prompt, parse_compose, parse_judgment, reply_prompt, regen_prompt, clean_reply,
    DraftingInputs, KbJudgment, LlmClient, SchedulingGrounding, COMPOSE_SYSTEM_PROMPT,
    KB_SYSTEM_PROMPT,
};
use barkline_core::availability::{
    availability, compact_open_slots, conflict_scan, AvailabilityWindow, DayAvailability,
    FactSet, SlotConflict, COMPACT_HORIZON_DAYS,
};
use barkline_core::cache::TtlCache;
use barkline_core::config::PipelineConfig;
use barkline_core::domain::{
    format_phone, minutes_to_display, normalize_phone, ClientId, Draft, DraftId, GroomerId,
    InboundMessage, MessageId,
};
use barkline_core::errors::{ApplicationError, DomainError};
use barkline_core::pipeline::{
    mentions_scheduling, DraftQueue, EscalationLog, SnapshotStore, Watermark,
};
use barkline_db::facts::load_horizon_facts;
use barkline_db::repositories::{
    BookingRepository, ClientRepository, MessageRepository, NewBooking, ScheduleRepository,
};

use crate::context::{self, Dossier};
use crate::delivery::{DeliveryClient, OutboundSms};
use crate::knowledge::KnowledgeStore;

/// Scan horizon for the per-groomer availability endpoint.
pub const AVAILABILITY_HORIZON_DAYS: u32 = 365;
/// Scan horizon for the conflict report.
pub const CONFLICT_HORIZON_DAYS: u32 = 120;

/// Dossiers change whenever a booking or note lands, so they stay hot for
/// only a minute.
pub const DOSSIER_TTL: Ttl = Ttl::from_secs(60);
pub const COMPACT_AVAILABILITY_TTL: Ttl = Ttl::from_secs(1800);
pub const HOLIDAYS_TTL: Ttl = Ttl::from_secs(86_400);

const COMPACT_AVAILABILITY_KEY: &str = "compact_avail";

fn persistence(error: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// The four stores the pipeline reads and writes, behind trait objects so
/// tests can swap in the in-memory fakes.
#[derive(Clone)]
pub struct Repositories {
    pub messages: Arc<dyn MessageRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub schedule: Arc<dyn ScheduleRepository>,
    pub clients: Arc<dyn ClientRepository>,
}

#[derive(Default)]
pub struct Caches {
    pub dossier: TtlCache<Dossier>,
    pub compact: TtlCache<String>,
    pub holidays: TtlCache<Vec<NaiveDate>>,
}

/// The owner phone numbers, matched on normalized digits. Inbound texts from
/// any of these bypass drafting and feed the knowledge base instead.
pub struct OwnerDirectory {
    numbers: HashSet<String>,
    primary: String,
}

impl OwnerDirectory {
    pub fn new<I, S>(phones: I, primary: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut numbers: HashSet<String> = phones
            .into_iter()
            .map(|phone| normalize_phone(phone.as_ref()))
            .filter(|digits| !digits.is_empty())
            .collect();
        let primary = normalize_phone(primary);
        numbers.insert(primary.clone());
        Self { numbers, primary }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.owner_phones, &config.owner_primary_phone)
    }

    pub fn is_owner(&self, phone: &str) -> bool {
        let digits = normalize_phone(phone);
        !digits.is_empty() && self.numbers.contains(&digits)
    }

    /// The number escalation questions are sent to.
    pub fn primary(&self) -> &str {
        &self.primary
    }
}

/// What one poll cycle did.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// First run: the watermark was primed and nothing was drafted.
    pub primed: bool,
    /// A previous cycle is still running; this one did nothing.
    pub busy: bool,
    pub drafted: usize,
    pub owner_replies: usize,
    pub skipped: usize,
}

/// A pending draft with the client dossier the review screen shows next to
/// it. Escalations carry no dossier.
#[derive(Serialize)]
pub struct DraftCard {
    #[serde(flatten)]
    pub draft: Draft,
    pub dossier: Option<Dossier>,
}

#[derive(Debug, Serialize)]
pub struct SendReceipt {
    pub draft_id: DraftId,
    pub message_id: i64,
}

#[derive(Serialize)]
pub struct AvailabilityReport {
    pub groomer_id: GroomerId,
    pub extended: bool,
    /// Some fact source failed to load; open days may be overstated.
    pub degraded: bool,
    pub days: Vec<DayAvailability>,
}

#[derive(Serialize)]
pub struct GroomerConflicts {
    pub groomer_id: GroomerId,
    pub groomer: String,
    pub degraded: bool,
    pub conflicts: Vec<SlotConflict>,
}

pub struct PipelineParts {
    pub repos: Repositories,
    pub drafts: DraftQueue,
    pub escalations: EscalationLog,
    pub watermark: Watermark,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub llm: Arc<dyn LlmClient>,
    pub delivery: Arc<dyn DeliveryClient>,
    pub knowledge: KnowledgeStore,
    pub owners: OwnerDirectory,
    pub batch_size: u32,
}

pub struct Pipeline {
    repos: Repositories,
    drafts: DraftQueue,
    escalations: EscalationLog,
    watermark: Watermark,
    snapshots: Arc<dyn SnapshotStore>,
    llm: Arc<dyn LlmClient>,
    delivery: Arc<dyn DeliveryClient>,
    knowledge: KnowledgeStore,
    caches: Caches,
    owners: OwnerDirectory,
    batch_size: u32,
    /// Held for the duration of a poll cycle; a cycle that finds it taken
    /// backs off instead of double-processing the batch.
    cycle_gate: tokio::sync::Mutex<()>,
    /// Serializes the check-then-insert in [`Pipeline::escalate`] so two
    /// simultaneous escalations cannot both pass the duplicate check.
    escalation_gate: tokio::sync::Mutex<()>,
}

impl Pipeline {
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            repos: parts.repos,
            drafts: parts.drafts,
            escalations: parts.escalations,
            watermark: parts.watermark,
            snapshots: parts.snapshots,
            llm: parts.llm,
            delivery: parts.delivery,
            knowledge: parts.knowledge,
            caches: Caches::default(),
            owners: parts.owners,
            batch_size: parts.batch_size,
            cycle_gate: tokio::sync::Mutex::new(()),
            escalation_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    // ---- poll cycle ----

    /// One poll cycle: on a first run, adopt the current message high-water
    /// mark without drafting the backlog; otherwise pull the next batch of
    /// unhandled messages and turn each into a draft or an owner-reply
    /// judgment.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, ApplicationError> {
        let Ok(_guard) = self.cycle_gate.try_lock() else {
            return Ok(CycleOutcome { busy: true, ..CycleOutcome::default() });
        };

        if !self.watermark.is_primed() {
            let max = self.repos.messages.max_message_id().await.map_err(persistence)?;
            self.watermark.prime(max.map(|id| id.0).unwrap_or(0));
            self.watermark.persist(self.snapshots.as_ref()).await.map_err(persistence)?;
            info!(
                event_name = "pipeline.watermark.primed",
                watermark = self.watermark.load(),
                "first cycle primed the watermark; backlog will not be drafted"
            );
            return Ok(CycleOutcome { primed: true, ..CycleOutcome::default() });
        }

        let batch = self
            .repos
            .messages
            .unhandled_after(MessageId(self.watermark.load()), self.batch_size)
            .await
            .map_err(persistence)?;
        let batch_len = batch.len();

        let mut outcome = CycleOutcome::default();
        for message in batch {
            if self.owners.is_owner(&message.phone) {
                // handled immediately: owner texts never get reply drafts
                self.repos.messages.mark_handled(message.id).await.map_err(persistence)?;
                if let Err(error) = self.handle_owner_reply(&message).await {
                    warn!(
                        event_name = "pipeline.owner.reply_failed",
                        message_id = message.id.0,
                        %error,
                        "owner reply processing failed; message stays handled"
                    );
                }
                outcome.owner_replies += 1;
            } else if self.drafts.contains_message(message.id).await {
                outcome.skipped += 1;
            } else {
                // a store failure aborts the rest of the batch; the watermark
                // has not moved past this message, so the next cycle
                // refetches and retries it
                self.draft_reply(&message).await?;
                outcome.drafted += 1;
            }
            self.watermark.advance_to(message.id.0);
        }

        if batch_len > 0 {
            self.watermark.persist(self.snapshots.as_ref()).await.map_err(persistence)?;
            info!(
                event_name = "pipeline.cycle.completed",
                drafted = outcome.drafted,
                owner_replies = outcome.owner_replies,
                skipped = outcome.skipped,
                watermark = self.watermark.load(),
            );
        }
        Ok(outcome)
    }

    /// Draft a reply for one client message. A failed model call still queues
    /// a draft with empty text so the reviewer sees the message.
    async fn draft_reply(&self, message: &InboundMessage) -> Result<(), ApplicationError> {
        let context = match message.client_id {
            Some(client_id) => context::client_context(
                self.repos.clients.as_ref(),
                self.repos.bookings.as_ref(),
                self.repos.messages.as_ref(),
                client_id,
                self.today(),
            )
            .await
            .map_err(persistence)?,
            None => None,
        };

        let draft = match &context {
            Some(context) => {
                let grounding_text = if mentions_scheduling(&message.body) {
                    Some(self.scheduling_grounding().await)
                } else {
                    None
                };
                let grounding = grounding_text.as_ref().map(|(slots, rules)| {
                    SchedulingGrounding { availability: slots, reference_doc: rules }
                });
                let inputs = DraftingInputs {
                    context,
                    their_message: &message.body,
                    grounding: grounding.as_ref(),
                };
                let (system, user) = reply_prompt(&inputs);
                let text = match self.llm.complete(&system, &user).await {
                    Ok(raw) => clean_reply(&raw),
                    Err(error) => {
                        warn!(
                            event_name = "pipeline.draft.model_failed",
                            message_id = message.id.0,
                            %error,
                            "drafting failed; queueing the message with empty text"
                        );
                        String::new()
                    }
                };
                Draft::inbound(
                    message,
                    context.display_name(),
                    context::prior_thread(context),
                    text,
                )
            }
            None => {
                let name = match message.client_id {
                    Some(client_id) => format!("Client {client_id}"),
                    None => format!("Client {}", format_phone(&message.phone)),
                };
                Draft::inbound(message, name, Vec::new(), String::new())
            }
        };

        let draft_id = draft.draft_id.clone();
        self.drafts.insert(draft).await.map_err(persistence)?;
        info!(
            event_name = "pipeline.draft.created",
            draft_id = %draft_id,
            message_id = message.id.0,
        );
        Ok(())
    }

    /// Judge an owner text against the knowledge base. The context comes from
    /// the escalation the reply most plausibly answers: the newest unmatched
    /// sent escalation, falling back to a still-unsent escalation draft.
    async fn handle_owner_reply(&self, message: &InboundMessage) -> Result<(), ApplicationError> {
        let (context, matched_id) = match self.escalations.most_recent_unmatched().await {
            Some((id, record)) => (Some(record.context), Some(id)),
            None => {
                let pending = self.drafts.pending_escalation().await;
                (pending.and_then(|draft| draft.escalation_context), None)
            }
        };

        let kb_head = match self.knowledge.head().await {
            Ok(head) => head,
            Err(error) => {
                warn!(event_name = "pipeline.owner.kb_unreadable", %error);
                String::new()
            }
        };

        let prompt = judgment_prompt(&message.body, context.as_deref(), &kb_head);
        let raw = self
            .llm
            .complete(KB_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;

        match parse_judgment(&raw) {
            KbJudgment::Store { category, content } => {
                self.knowledge.append(&category, &content).await.map_err(persistence)?;
                if let Some(ref id) = matched_id {
                    self.escalations.mark_matched(&id).await.map_err(persistence)?;
                }
                info!(
                    event_name = "pipeline.owner.knowledge_stored",
                    category = %category,
                    matched_escalation = matched_id.is_some(),
                );
            }
            KbJudgment::Skip => {
                info!(event_name = "pipeline.owner.judgment_skip", message_id = message.id.0);
            }
        }
        Ok(())
    }

    async fn scheduling_grounding(&self) -> (String, String) {
        let slots = match self.compact_availability().await {
            Ok(text) => text,
            Err(error) => {
                warn!(event_name = "pipeline.grounding.availability_failed", %error);
                String::new()
            }
        };
        let rules = match self.knowledge.reference_head().await {
            Ok(text) => text,
            Err(error) => {
                warn!(event_name = "pipeline.grounding.reference_failed", %error);
                String::new()
            }
        };
        (slots, rules)
    }

    // ---- availability ----

    /// Salon closures for a horizon, cached for a day and keyed by the exact
    /// window so overlapping scans share the hit.
    async fn cached_closures(&self, start: NaiveDate, days: u32) -> FactSet<NaiveDate> {
        let key = format!("holidays:{start}:{days}");
        if let Some(dates) = self.caches.holidays.get(&key).await {
            return FactSet::fresh(dates);
        }
        let end = start + Duration::days(i64::from(days));
        match self.repos.schedule.closures_between(start, end).await {
            Ok(dates) => {
                self.caches.holidays.set(key, dates.clone(), HOLIDAYS_TTL).await;
                FactSet::fresh(dates)
            }
            Err(error) => {
                warn!(
                    event_name = "pipeline.closures.degraded",
                    %error,
                    "closure dates unavailable; scans proceed without them"
                );
                FactSet::degraded()
            }
        }
    }

    /// Days with open slots for one groomer over the next year.
    pub async fn groomer_availability(
        &self,
        groomer_id: GroomerId,
        extended: bool,
    ) -> Result<AvailabilityReport, ApplicationError> {
        let start = self.today() + Duration::days(1);
        let end = start + Duration::days(i64::from(AVAILABILITY_HORIZON_DAYS));
        let closures = self.cached_closures(start, AVAILABILITY_HORIZON_DAYS).await;
        let facts = load_horizon_facts(
            self.repos.schedule.as_ref(),
            groomer_id,
            start,
            end,
            closures,
        )
        .await;
        let bookings = self
            .repos
            .bookings
            .for_groomer_between(groomer_id, start, end)
            .await
            .map_err(persistence)?;

        let window = AvailabilityWindow { start, days: AVAILABILITY_HORIZON_DAYS, extended };
        Ok(AvailabilityReport {
            groomer_id,
            extended,
            degraded: facts.is_degraded(),
            days: availability(&facts, &bookings, &window),
        })
    }

    /// Slots every groomer's booking screen shows as open while a recorded
    /// appointment window physically overlaps them.
    pub async fn conflict_report(&self) -> Result<Vec<GroomerConflicts>, ApplicationError> {
        let start = self.today() + Duration::days(1);
        let end = start + Duration::days(i64::from(CONFLICT_HORIZON_DAYS));
        let closures = self.cached_closures(start, CONFLICT_HORIZON_DAYS).await;
        // the extended slot is always scanned; a conflict there is just as
        // double-booked as one at 8:30
        let window =
            AvailabilityWindow { start, days: CONFLICT_HORIZON_DAYS, extended: true };

        let groomers = self.repos.schedule.active_groomers().await.map_err(persistence)?;
        let mut reports = Vec::with_capacity(groomers.len());
        for groomer in groomers {
            let facts = load_horizon_facts(
                self.repos.schedule.as_ref(),
                groomer.id,
                start,
                end,
                closures.clone(),
            )
            .await;
            let bookings = self
                .repos
                .bookings
                .for_groomer_between(groomer.id, start, end)
                .await
                .map_err(persistence)?;
            reports.push(GroomerConflicts {
                groomer_id: groomer.id,
                groomer: groomer.name,
                degraded: facts.is_degraded(),
                conflicts: conflict_scan(&facts, &bookings, &window),
            });
        }
        Ok(reports)
    }

    /// One line per groomer of upcoming open slots, sized for a prompt.
    /// Cached for half an hour and invalidated when a booking lands.
    pub async fn compact_availability(&self) -> Result<String, ApplicationError> {
        if let Some(text) = self.caches.compact.get(COMPACT_AVAILABILITY_KEY).await {
            return Ok(text);
        }
        let text = self.render_compact_availability().await?;
        self.caches
            .compact
            .set(COMPACT_AVAILABILITY_KEY, text.clone(), COMPACT_AVAILABILITY_TTL)
            .await;
        Ok(text)
    }

    async fn render_compact_availability(&self) -> Result<String, ApplicationError> {
        let start = self.today() + Duration::days(1);
        let end = start + Duration::days(i64::from(COMPACT_HORIZON_DAYS));
        let closures = self.cached_closures(start, COMPACT_HORIZON_DAYS).await;

        let groomers = self.repos.schedule.active_groomers().await.map_err(persistence)?;
        let mut lines = Vec::with_capacity(groomers.len());
        for groomer in groomers {
            let facts = load_horizon_facts(
                self.repos.schedule.as_ref(),
                groomer.id,
                start,
                end,
                closures.clone(),
            )
            .await;
            let bookings = self
                .repos
                .bookings
                .for_groomer_between(groomer.id, start, end)
                .await
                .map_err(persistence)?;

            let label = match &groomer.note {
                Some(note) => format!("{} ({note})", groomer.name),
                None => groomer.name.clone(),
            };
            let slots = compact_open_slots(&facts, &bookings, start);
            if slots.is_empty() {
                lines.push(format!("{label}: no slots in next {COMPACT_HORIZON_DAYS} days"));
            } else {
                let rendered: Vec<String> = slots
                    .iter()
                    .flat_map(|(date, starts)| {
                        starts.iter().map(move |slot| {
                            format!(
                                "{} {} {} {}",
                                date.format("%a"),
                                date.format("%b"),
                                date.day(),
                                minutes_to_display(*slot),
                            )
                        })
                    })
                    .collect();
                lines.push(format!("{label}: {}", rendered.join(", ")));
            }
        }
        Ok(lines.join("\n"))
    }

    // ---- reviewer operations ----

    /// Pending drafts, oldest first, each with the client dossier when one
    /// can be built.
    pub async fn list_drafts(&self) -> Result<Vec<DraftCard>, ApplicationError> {
        let drafts = self.drafts.list().await;
        let mut cards = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let dossier = match (draft.is_escalation, draft.client_id) {
                (false, Some(client_id)) => self.client_dossier(client_id).await?,
                _ => None,
            };
            cards.push(DraftCard { draft, dossier });
        }
        Ok(cards)
    }

    /// Send a draft, optionally with reviewer-edited text. The draft is
    /// claimed out of the queue first so a concurrent dismiss cannot also
    /// act on it; the claim keeps blocking duplicate escalations while the
    /// delivery call runs, and a failed delivery puts the draft back for
    /// retry.
    pub async fn send_draft(
        &self,
        id: &DraftId,
        edited: Option<String>,
    ) -> Result<SendReceipt, ApplicationError> {
        let Some(mut draft) = self.drafts.claim(id).await.map_err(persistence)? else {
            return Err(DomainError::UnknownDraft(id.to_string()).into());
        };

        if let Some(text) = edited {
            if !text.trim().is_empty() {
                draft.draft = text;
            }
        }
        if draft.draft.trim().is_empty() {
            self.drafts.release_claim(draft).await.map_err(persistence)?;
            return Err(DomainError::EmptyDraft(id.to_string()).into());
        }

        let sms = OutboundSms {
            phone: draft.phone.clone(),
            body: draft.draft.clone(),
            client_id: draft.client_id,
        };
        if let Err(error) = self.delivery.send(&sms).await {
            self.drafts.release_claim(draft).await.map_err(persistence)?;
            return Err(ApplicationError::Integration(error.to_string()));
        }
        self.drafts.discard_claim(id).await;

        if draft.is_escalation {
            self.escalations
                .record_sent(
                    draft.draft_id.clone(),
                    draft.escalation_context.clone().unwrap_or_default(),
                )
                .await
                .map_err(persistence)?;
        }
        if let Some(message_id) = draft.message_id {
            self.repos.messages.mark_handled(message_id).await.map_err(persistence)?;
        }
        let recorded = self
            .repos
            .messages
            .record_assistant_reply(draft.client_id, &draft.phone, &draft.draft)
            .await
            .map_err(persistence)?;

        info!(
            event_name = "pipeline.draft.sent",
            draft_id = %draft.draft_id,
            message_id = recorded.0,
            escalation = draft.is_escalation,
        );
        Ok(SendReceipt { draft_id: draft.draft_id, message_id: recorded.0 })
    }

    pub async fn dismiss_draft(&self, id: &DraftId) -> Result<(), ApplicationError> {
        match self.drafts.remove(id).await.map_err(persistence)? {
            Some(draft) => {
                info!(event_name = "pipeline.draft.dismissed", draft_id = %draft.draft_id);
                Ok(())
            }
            None => Err(DomainError::UnknownDraft(id.to_string()).into()),
        }
    }

    /// Redraft against reviewer feedback, keeping the draft id and metadata.
    pub async fn regenerate_draft(
        &self,
        id: &DraftId,
        feedback: &str,
    ) -> Result<Draft, ApplicationError> {
        if feedback.trim().is_empty() {
            return Err(DomainError::MissingFeedback.into());
        }
        let Some(draft) = self.drafts.get(id).await else {
            return Err(DomainError::UnknownDraft(id.to_string()).into());
        };

        let context = match draft.client_id {
            Some(client_id) => context::client_context(
                self.repos.clients.as_ref(),
                self.repos.bookings.as_ref(),
                self.repos.messages.as_ref(),
                client_id,
                self.today(),
            )
            .await
            .map_err(persistence)?,
            None => None,
        };
        let Some(context) = context else {
            return Err(DomainError::UnknownClient(
                draft.client_id.map(|client_id| client_id.0).unwrap_or(0),
            )
            .into());
        };

        let grounding_text = if mentions_scheduling(&draft.their_message) {
            Some(self.scheduling_grounding().await)
        } else {
            None
        };
        let grounding = grounding_text
            .as_ref()
            .map(|(slots, rules)| SchedulingGrounding { availability: slots, reference_doc: rules });
        let inputs = DraftingInputs {
            context: &context,
            their_message: &draft.their_message,
            grounding: grounding.as_ref(),
        };
        let (system, user) = regen_prompt(&inputs, &draft.draft, feedback);
        let raw = self
            .llm
            .complete(&system, &user)
            .await
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;
        let text = clean_reply(&raw);
        if text.is_empty() {
            return Err(ApplicationError::Integration(
                "model returned an empty revision".to_string(),
            ));
        }

        match self.drafts.replace_text(id, text).await.map_err(persistence)? {
            Some(updated) => {
                info!(event_name = "pipeline.draft.regenerated", draft_id = %updated.draft_id);
                Ok(updated)
            }
            None => Err(DomainError::UnknownDraft(id.to_string()).into()),
        }
    }

    /// Turn a natural-language staff instruction into a queued draft: the
    /// model proposes a client lookup and message text, and the lookup must
    /// land on a real client.
    pub async fn compose(&self, instruction: &str) -> Result<Draft, ApplicationError> {
        let raw = self
            .llm
            .complete(COMPOSE_SYSTEM_PROMPT, instruction)
            .await
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;
        let plan = parse_compose(&raw)
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;

        let query = plan.client.strip_prefix("pet:").unwrap_or(&plan.client);
        let Some(client) = self.repos.clients.search(query).await.map_err(persistence)? else {
            return Err(DomainError::ClientNotMatched(plan.client).into());
        };

        let draft =
            Draft::composed(client.id, client.full_name(), client.phone.clone(), plan.draft);
        self.drafts.insert(draft.clone()).await.map_err(persistence)?;
        info!(
            event_name = "pipeline.draft.composed",
            draft_id = %draft.draft_id,
            client_id = client.id.0,
        );
        Ok(draft)
    }

    /// Queue staff-written text verbatim, no model involved.
    pub async fn queue_outbound(
        &self,
        client_id: Option<ClientId>,
        client_name: Option<String>,
        phone: &str,
        message: &str,
    ) -> Result<Draft, ApplicationError> {
        let name = client_name.unwrap_or_else(|| format_phone(phone));
        let draft = Draft::queued(
            client_id.unwrap_or(ClientId(0)),
            name,
            phone.to_string(),
            message.to_string(),
        );
        self.drafts.insert(draft.clone()).await.map_err(persistence)?;
        info!(event_name = "pipeline.draft.queued", draft_id = %draft.draft_id);
        Ok(draft)
    }

    /// Queue a question for the owner. If an escalation is already waiting
    /// unsent, it is returned instead of stacking another one.
    pub async fn escalate(
        &self,
        question: &str,
        context_text: &str,
    ) -> Result<Draft, ApplicationError> {
        let _gate = self.escalation_gate.lock().await;
        if let Some(existing) = self.drafts.pending_escalation().await {
            info!(
                event_name = "pipeline.escalation.deduplicated",
                draft_id = %existing.draft_id,
            );
            return Ok(existing);
        }

        let draft = Draft::escalation(
            question.to_string(),
            context_text.to_string(),
            self.owners.primary().to_string(),
        );
        self.drafts.insert(draft.clone()).await.map_err(persistence)?;
        info!(event_name = "pipeline.escalation.queued", draft_id = %draft.draft_id);
        Ok(draft)
    }

    /// Review-card snapshot for one client, cached briefly.
    pub async fn client_dossier(
        &self,
        client_id: ClientId,
    ) -> Result<Option<Dossier>, ApplicationError> {
        let key = format!("dossier:{client_id}");
        if let Some(dossier) = self.caches.dossier.get(&key).await {
            return Ok(Some(dossier));
        }
        let dossier = context::build_dossier(
            self.repos.clients.as_ref(),
            self.repos.bookings.as_ref(),
            client_id,
            self.today(),
        )
        .await
        .map_err(persistence)?;
        if let Some(dossier) = &dossier {
            self.caches.dossier.set(key, dossier.clone(), DOSSIER_TTL).await;
        }
        Ok(dossier)
    }

    /// Record a booking and drop every cache it can invalidate: the compact
    /// digest, the closure windows, and the client's dossier.
    pub async fn record_booking(
        &self,
        booking: &NewBooking,
        client_id: Option<ClientId>,
    ) -> Result<i64, ApplicationError> {
        if let Some(end_min) = booking.end_min {
            if end_min <= booking.start_min {
                return Err(DomainError::InvalidTimeRange {
                    start_min: booking.start_min,
                    end_min,
                }
                .into());
            }
        }

        let booking_id = self.repos.bookings.insert(booking).await.map_err(persistence)?;
        self.caches.compact.delete(COMPACT_AVAILABILITY_KEY).await;
        self.caches.holidays.delete_prefix("holidays:").await;
        if let Some(client_id) = client_id {
            self.caches.dossier.delete(&format!("dossier:{client_id}")).await;
        }
        info!(
            event_name = "pipeline.booking.recorded",
            booking_id,
            groomer_id = booking.groomer_id.0,
            date = %booking.date,
        );
        Ok(booking_id)
    }
}


#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{Duration, Local, NaiveDate};
    use tempfile::TempDir;
    use tokio::sync::{mpsc, Mutex as AsyncMutex};

    use barkline_agent::LlmClient;
    use barkline_core::domain::{
        Client, ClientId, ClientStats, GroomerId, NoteEntry, Pet, PetId, ServiceKind,
    };
    use barkline_core::errors::{ApplicationError, DomainError};
    use barkline_core::pipeline::{
        DraftQueue, EscalationLog, InMemorySnapshotStore, Watermark,
    };
    use barkline_db::repositories::{
        ClientRepository, InMemoryBookingRepository, InMemoryClientRepository,
        InMemoryMessageRepository, InMemoryScheduleRepository, NewBooking, RepositoryError,
    };

    use crate::delivery::{DeliveryClient, DeliveryError, OutboundSms};
    use crate::knowledge::KnowledgeStore;

    use super::{
        OwnerDirectory, Pipeline, PipelineParts, Repositories, COMPACT_AVAILABILITY_TTL,
        DOSSIER_TTL, HOLIDAYS_TTL,
    };

    const OWNER_PHONE: &str = "6155550199";

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, String>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedLlm {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn push_ok(&self, reply: &str) {
            self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
        }

        fn push_err(&self, message: &str) {
            self.replies.lock().unwrap().push_back(Err(message.to_string()));
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push((system.to_string(), user.to_string()));
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Err(anyhow!("no scripted reply left")),
            }
        }
    }

    struct RecordingDelivery {
        sent: Mutex<Vec<OutboundSms>>,
        fail: AtomicBool,
    }

    impl RecordingDelivery {
        fn new() -> Arc<Self> {
            Arc::new(Self { sent: Mutex::new(Vec::new()), fail: AtomicBool::new(false) })
        }

        fn sent(&self) -> Vec<OutboundSms> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryClient for RecordingDelivery {
        async fn send(&self, sms: &OutboundSms) -> Result<Option<i64>, DeliveryError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DeliveryError::Transport("wire down".to_string()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(sms.clone());
            Ok(Some(900 + sent.len() as i64))
        }
    }

    struct Harness {
        pipeline: Arc<Pipeline>,
        messages: Arc<InMemoryMessageRepository>,
        bookings: Arc<InMemoryBookingRepository>,
        schedule: Arc<InMemoryScheduleRepository>,
        clients: Arc<InMemoryClientRepository>,
        llm: Arc<ScriptedLlm>,
        delivery: Arc<RecordingDelivery>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let messages = Arc::new(InMemoryMessageRepository::new());
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let schedule = Arc::new(InMemoryScheduleRepository::new());
        let clients = Arc::new(InMemoryClientRepository::new());
        let llm = ScriptedLlm::new();
        let delivery = RecordingDelivery::new();
        let snapshots = Arc::new(InMemorySnapshotStore::new());

        let pipeline = Pipeline::new(PipelineParts {
            repos: Repositories {
                messages: messages.clone(),
                bookings: bookings.clone(),
                schedule: schedule.clone(),
                clients: clients.clone(),
            },
            drafts: DraftQueue::new(snapshots.clone()),
            escalations: EscalationLog::new(snapshots.clone()),
            watermark: Watermark::unprimed(),
            snapshots,
            llm: llm.clone(),
            delivery: delivery.clone(),
            knowledge: KnowledgeStore::new(
                dir.path().join("kb.md"),
                dir.path().join("reference.md"),
            ),
            owners: OwnerDirectory::new([OWNER_PHONE], OWNER_PHONE),
            batch_size: 20,
        });

        Harness {
            pipeline: Arc::new(pipeline),
            messages,
            bookings,
            schedule,
            clients,
            llm,
            delivery,
            _dir: dir,
        }
    }

    /// Like [`harness`], but with the client store and delivery swapped for
    /// the test's own doubles.
    fn harness_with(
        clients: Arc<dyn ClientRepository>,
        delivery: Arc<dyn DeliveryClient>,
    ) -> (Arc<Pipeline>, Arc<InMemoryMessageRepository>, Arc<ScriptedLlm>, TempDir) {
        let dir = TempDir::new().unwrap();
        let messages = Arc::new(InMemoryMessageRepository::new());
        let llm = ScriptedLlm::new();
        let snapshots = Arc::new(InMemorySnapshotStore::new());

        let pipeline = Pipeline::new(PipelineParts {
            repos: Repositories {
                messages: messages.clone(),
                bookings: Arc::new(InMemoryBookingRepository::new()),
                schedule: Arc::new(InMemoryScheduleRepository::new()),
                clients,
            },
            drafts: DraftQueue::new(snapshots.clone()),
            escalations: EscalationLog::new(snapshots.clone()),
            watermark: Watermark::unprimed(),
            snapshots,
            llm: llm.clone(),
            delivery,
            knowledge: KnowledgeStore::new(
                dir.path().join("kb.md"),
                dir.path().join("reference.md"),
            ),
            owners: OwnerDirectory::new([OWNER_PHONE], OWNER_PHONE),
            batch_size: 20,
        });

        (Arc::new(pipeline), messages, llm, dir)
    }

    /// Holds each send open until the test hands down a verdict.
    struct GatedDelivery {
        entered: mpsc::Sender<()>,
        verdicts: AsyncMutex<mpsc::Receiver<Result<Option<i64>, DeliveryError>>>,
    }

    #[async_trait]
    impl DeliveryClient for GatedDelivery {
        async fn send(&self, _sms: &OutboundSms) -> Result<Option<i64>, DeliveryError> {
            let _ = self.entered.send(()).await;
            match self.verdicts.lock().await.recv().await {
                Some(verdict) => verdict,
                None => Err(DeliveryError::Transport("gate closed".to_string())),
            }
        }
    }

    /// In-memory client store whose next `find` fails once.
    struct FlakyClients {
        inner: InMemoryClientRepository,
        fail_next: AtomicBool,
    }

    impl FlakyClients {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryClientRepository::new(),
                fail_next: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ClientRepository for FlakyClients {
        async fn find(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::Decode("storage offline".to_string()));
            }
            self.inner.find(id).await
        }

        async fn find_by_phone(&self, phone: &str) -> Result<Option<Client>, RepositoryError> {
            self.inner.find_by_phone(phone).await
        }

        async fn search(&self, query: &str) -> Result<Option<Client>, RepositoryError> {
            self.inner.search(query).await
        }

        async fn pets_for(&self, id: ClientId) -> Result<Vec<Pet>, RepositoryError> {
            self.inner.pets_for(id).await
        }

        async fn notes_for(
            &self,
            id: ClientId,
            limit: u32,
        ) -> Result<Vec<NoteEntry>, RepositoryError> {
            self.inner.notes_for(id, limit).await
        }

        async fn stats_for(&self, id: ClientId) -> Result<Option<ClientStats>, RepositoryError> {
            self.inner.stats_for(id).await
        }
    }

    fn dana() -> Client {
        Client {
            id: ClientId(42),
            first_name: "Dana".to_string(),
            last_name: "Harper".to_string(),
            phone: "6155550101".to_string(),
            warning: None,
            inactive: false,
        }
    }

    #[tokio::test]
    async fn first_cycle_primes_without_drafting_the_backlog() {
        let h = harness();
        h.messages.push_inbound(Some(ClientId(42)), "6155550101", "old message one");
        h.messages.push_inbound(Some(ClientId(42)), "6155550101", "old message two");

        let outcome = h.pipeline.run_cycle().await.unwrap();
        assert!(outcome.primed);
        assert_eq!(outcome.drafted, 0);
        assert!(h.pipeline.list_drafts().await.unwrap().is_empty());

        // only messages after the primed mark get drafted
        h.clients.add_client(dana());
        h.llm.push_ok("Hi Dana, of course.");
        h.messages.push_inbound(Some(ClientId(42)), "6155550101", "thanks so much");
        let outcome = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(outcome.drafted, 1);
    }

    #[tokio::test]
    async fn repolling_never_drafts_the_same_message_twice() {
        let h = harness();
        h.pipeline.run_cycle().await.unwrap();
        h.clients.add_client(dana());
        h.llm.push_ok("Hi Dana.");
        h.messages.push_inbound(Some(ClientId(42)), "6155550101", "hello there");

        h.pipeline.run_cycle().await.unwrap();
        h.pipeline.run_cycle().await.unwrap();
        assert_eq!(h.pipeline.list_drafts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn model_failure_still_queues_a_draft_with_empty_text() {
        let h = harness();
        h.pipeline.run_cycle().await.unwrap();
        h.clients.add_client(dana());
        h.llm.push_err("provider melted");
        h.messages.push_inbound(Some(ClientId(42)), "6155550101", "quick question");

        let outcome = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(outcome.drafted, 1);
        let cards = h.pipeline.list_drafts().await.unwrap();
        assert_eq!(cards[0].draft.draft, "");
        assert_eq!(cards[0].draft.client_name, "Dana Harper");
    }

    #[tokio::test]
    async fn unknown_numbers_are_queued_under_a_phone_label() {
        let h = harness();
        h.pipeline.run_cycle().await.unwrap();
        h.messages.push_inbound(None, "4155550123", "do you groom cats?");

        h.pipeline.run_cycle().await.unwrap();
        let cards = h.pipeline.list_drafts().await.unwrap();
        assert_eq!(cards[0].draft.client_name, "Client (415) 555-0123");
        assert_eq!(cards[0].draft.draft, "");
        // no model call for a client we know nothing about
        assert!(h.llm.calls().is_empty());
    }

    #[tokio::test]
    async fn scheduling_messages_pull_grounding_into_the_prompt() {
        let h = harness();
        h.pipeline.run_cycle().await.unwrap();
        h.clients.add_client(dana());
        h.llm.push_ok("Hi Dana, we have Tuesday 8:30 open.");
        h.messages.push_inbound(Some(ClientId(42)), "6155550101", "any openings next week?");

        h.pipeline.run_cycle().await.unwrap();

        let calls = h.llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("SCHEDULING RULES"));
        assert!(calls[0].1.contains("REAL OPEN SLOTS"));
    }

    #[tokio::test]
    async fn owner_reply_is_judged_and_stored_against_the_sent_escalation() {
        let h = harness();
        h.pipeline.run_cycle().await.unwrap();

        let escalation = h
            .pipeline
            .escalate("Do we board overnight?", "client 42 asked about boarding")
            .await
            .unwrap();
        h.pipeline.send_draft(&escalation.draft_id, None).await.unwrap();
        assert_eq!(h.delivery.sent().len(), 1);

        h.llm.push_ok("CATEGORY: Services\nCONTENT: We do not board dogs overnight.");
        let id = h.messages.push_inbound(None, OWNER_PHONE, "no overnight boarding");
        let outcome = h.pipeline.run_cycle().await.unwrap();

        assert_eq!(outcome.owner_replies, 1);
        assert_eq!(outcome.drafted, 0);
        assert!(h.messages.is_handled(id));
        let kb = h.pipeline.knowledge.head().await.unwrap();
        assert!(kb.contains("We do not board dogs overnight."));
        // the escalation counts as answered
        assert!(h.pipeline.escalations.most_recent_unmatched().await.is_none());
        // the judgment prompt carried the escalation question
        let calls = h.llm.calls();
        assert!(calls.last().unwrap().1.contains("client 42 asked about boarding"));
    }

    #[tokio::test]
    async fn owner_chitchat_is_skipped() {
        let h = harness();
        h.pipeline.run_cycle().await.unwrap();
        h.llm.push_ok("NOT_KB");
        let id = h.messages.push_inbound(None, "(615) 555-0199", "sounds good, thanks");

        let outcome = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(outcome.owner_replies, 1);
        assert!(h.messages.is_handled(id));
        assert_eq!(h.pipeline.knowledge.head().await.unwrap(), "");
    }

    #[tokio::test]
    async fn escalations_deduplicate_while_one_is_unsent() {
        let h = harness();
        let first = h.pipeline.escalate("Do we board?", "ctx").await.unwrap();
        let second = h.pipeline.escalate("Different question", "ctx2").await.unwrap();
        assert_eq!(first.draft_id, second.draft_id);

        h.pipeline.send_draft(&first.draft_id, None).await.unwrap();
        let third = h.pipeline.escalate("Different question", "ctx2").await.unwrap();
        assert_ne!(first.draft_id, third.draft_id);
    }

    #[tokio::test]
    async fn send_marks_the_source_message_handled() {
        let h = harness();
        h.pipeline.run_cycle().await.unwrap();
        h.clients.add_client(dana());
        h.llm.push_ok("Hi Dana, see you then.");
        let id = h.messages.push_inbound(Some(ClientId(42)), "6155550101", "see you friday");
        h.pipeline.run_cycle().await.unwrap();
        assert!(!h.messages.is_handled(id));

        let draft_id = h.pipeline.list_drafts().await.unwrap()[0].draft.draft_id.clone();
        let receipt = h
            .pipeline
            .send_draft(&draft_id, Some("Hi Dana, Friday at 10 works.".to_string()))
            .await
            .unwrap();
        assert_eq!(receipt.draft_id, draft_id);
        assert!(h.messages.is_handled(id));
        assert_eq!(h.delivery.sent()[0].body, "Hi Dana, Friday at 10 works.");
        assert!(h.pipeline.list_drafts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_returns_the_draft_to_the_queue() {
        let h = harness();
        let draft = h
            .pipeline
            .queue_outbound(Some(ClientId(42)), None, "6155550101", "Reminder: Friday 10am")
            .await
            .unwrap();

        h.delivery.fail.store(true, Ordering::SeqCst);
        let result = h.pipeline.send_draft(&draft.draft_id, None).await;
        assert!(matches!(result, Err(ApplicationError::Integration(_))));
        assert_eq!(h.pipeline.list_drafts().await.unwrap().len(), 1);

        h.delivery.fail.store(false, Ordering::SeqCst);
        h.pipeline.send_draft(&draft.draft_id, None).await.unwrap();
        assert!(h.pipeline.list_drafts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn escalations_deduplicate_against_a_send_in_flight() {
        let (entered_tx, mut entered_rx) = mpsc::channel(1);
        let (verdict_tx, verdict_rx) = mpsc::channel(1);
        let delivery = Arc::new(GatedDelivery {
            entered: entered_tx,
            verdicts: AsyncMutex::new(verdict_rx),
        });
        let (pipeline, _messages, _llm, _dir) =
            harness_with(Arc::new(InMemoryClientRepository::new()), delivery);

        let first = pipeline.escalate("Do we board?", "ctx").await.unwrap();
        let send = {
            let pipeline = pipeline.clone();
            let id = first.draft_id.clone();
            tokio::spawn(async move { pipeline.send_draft(&id, None).await })
        };
        entered_rx.recv().await.unwrap();

        // the first escalation is mid delivery; a second question still
        // dedups to it instead of queueing a duplicate
        let second = pipeline.escalate("Another question", "ctx2").await.unwrap();
        assert_eq!(second.draft_id, first.draft_id);

        verdict_tx
            .send(Err(DeliveryError::Transport("wire down".to_string())))
            .await
            .unwrap();
        assert!(send.await.unwrap().is_err());

        // the failed send put the draft back; still exactly one escalation
        let drafts = pipeline.list_drafts().await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].draft.is_escalation);
        let third = pipeline.escalate("Yet another", "ctx3").await.unwrap();
        assert_eq!(third.draft_id, first.draft_id);
    }

    #[tokio::test]
    async fn store_failure_aborts_the_batch_and_the_next_cycle_retries() {
        let clients = FlakyClients::new();
        let delivery = RecordingDelivery::new();
        let (pipeline, messages, llm, _dir) = harness_with(clients.clone(), delivery);

        pipeline.run_cycle().await.unwrap();
        clients.inner.add_client(dana());
        llm.push_ok("Hi Dana.");
        messages.push_inbound(Some(ClientId(42)), "6155550101", "hello there");

        clients.fail_next.store(true, Ordering::SeqCst);
        assert!(pipeline.run_cycle().await.is_err());
        assert!(pipeline.list_drafts().await.unwrap().is_empty());

        // the watermark never passed the failed message; the retry drafts it
        let outcome = pipeline.run_cycle().await.unwrap();
        assert_eq!(outcome.drafted, 1);
        assert_eq!(pipeline.list_drafts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_text_cannot_be_sent() {
        let h = harness();
        let draft = h
            .pipeline
            .queue_outbound(None, Some("Dana Harper".to_string()), "6155550101", "")
            .await
            .unwrap();

        let result = h.pipeline.send_draft(&draft.draft_id, None).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::EmptyDraft(_)))
        ));
        // rejected, not consumed
        assert_eq!(h.pipeline.list_drafts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_send_and_dismiss_resolve_to_one_winner() {
        let h = harness();
        let draft = h
            .pipeline
            .queue_outbound(None, None, "6155550101", "Reminder: Friday 10am")
            .await
            .unwrap();

        let send = {
            let pipeline = h.pipeline.clone();
            let id = draft.draft_id.clone();
            tokio::spawn(async move { pipeline.send_draft(&id, None).await })
        };
        let dismiss = {
            let pipeline = h.pipeline.clone();
            let id = draft.draft_id.clone();
            tokio::spawn(async move { pipeline.dismiss_draft(&id).await })
        };

        let sent = send.await.unwrap().is_ok();
        let dismissed = dismiss.await.unwrap().is_ok();
        assert!(sent != dismissed, "exactly one operation should win");
        assert_eq!(h.delivery.sent().len(), usize::from(sent));
        assert!(h.pipeline.list_drafts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn regenerate_requires_feedback_and_replaces_text() {
        let h = harness();
        h.pipeline.run_cycle().await.unwrap();
        h.clients.add_client(dana());
        h.llm.push_ok("Hi Dana, slots are open.");
        h.messages.push_inbound(Some(ClientId(42)), "6155550101", "got anything thursday?");
        h.pipeline.run_cycle().await.unwrap();
        let draft_id = h.pipeline.list_drafts().await.unwrap()[0].draft.draft_id.clone();

        let result = h.pipeline.regenerate_draft(&draft_id, "  ").await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::MissingFeedback))
        ));

        h.llm.push_ok("Hi Dana, Thursday 11:30 is open.");
        let updated =
            h.pipeline.regenerate_draft(&draft_id, "offer the 11:30 instead").await.unwrap();
        assert_eq!(updated.draft, "Hi Dana, Thursday 11:30 is open.");
        assert_eq!(updated.draft_id, draft_id);
    }

    #[tokio::test]
    async fn compose_matches_a_client_or_fails() {
        let h = harness();
        h.clients.add_client(dana());

        h.llm.push_ok(r#"{"client": "Dana Harper", "draft": "Hi Dana, Biscuit is ready."}"#);
        let draft = h.pipeline.compose("tell dana her dog is ready").await.unwrap();
        assert_eq!(draft.client_id, Some(ClientId(42)));
        assert_eq!(draft.phone, "6155550101");
        assert!(draft.draft_id.0.starts_with("compose-"));

        h.llm.push_ok(r#"{"client": "Nobody Real", "draft": "Hi."}"#);
        let result = h.pipeline.compose("text someone unknown").await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::ClientNotMatched(_)))
        ));
    }

    #[tokio::test]
    async fn compact_availability_is_rendered_per_groomer_and_cached() {
        let h = harness();
        let tomorrow = Local::now().date_naive() + Duration::days(1);
        h.schedule.add_groomer(GroomerId(85), "Tomoko", None);
        h.schedule.add_groomer(GroomerId(86), "Kumi", Some("Tue-Thu"));
        h.schedule.add_working_range(GroomerId(85), tomorrow, tomorrow + Duration::days(9));

        let text = h.pipeline.compact_availability().await.unwrap();
        assert!(text.contains("Tomoko: "));
        assert!(text.contains("8:30 AM"));
        assert!(text.contains("Kumi (Tue-Thu): no slots in next 45 days"));

        // cached: new working days are not visible until the entry expires
        h.schedule.add_working_range(GroomerId(86), tomorrow, tomorrow + Duration::days(9));
        assert_eq!(h.pipeline.compact_availability().await.unwrap(), text);
    }

    #[tokio::test]
    async fn recording_a_booking_invalidates_the_caches() {
        let h = harness();
        let today = Local::now().date_naive();
        h.pipeline
            .caches
            .compact
            .set("compact_avail", "stale digest".to_string(), COMPACT_AVAILABILITY_TTL)
            .await;
        h.pipeline
            .caches
            .holidays
            .set(format!("holidays:{today}:45"), Vec::new(), HOLIDAYS_TTL)
            .await;
        let dossier_key = "dossier:42";
        h.clients.add_client(dana());
        let dossier = h.pipeline.client_dossier(ClientId(42)).await.unwrap().unwrap();
        h.pipeline.caches.dossier.set(dossier_key, dossier, DOSSIER_TTL).await;

        let booking = NewBooking {
            groomer_id: GroomerId(85),
            pet_id: PetId(7),
            date: today + Duration::days(3),
            start_min: 600,
            end_min: Some(690),
            service: ServiceKind::FullGroom,
        };
        h.pipeline.record_booking(&booking, Some(ClientId(42))).await.unwrap();

        assert_eq!(h.bookings.inserted().len(), 1);
        assert!(h.pipeline.caches.compact.get("compact_avail").await.is_none());
        assert!(h
            .pipeline
            .caches
            .holidays
            .get(&format!("holidays:{today}:45"))
            .await
            .is_none());
        assert!(h.pipeline.caches.dossier.get(dossier_key).await.is_none());
    }

    #[tokio::test]
    async fn bookings_with_inverted_windows_are_rejected() {
        let h = harness();
        let booking = NewBooking {
            groomer_id: GroomerId(85),
            pet_id: PetId(7),
            date: NaiveDate::from_ymd_opt(2026, 9, 15).unwrap(),
            start_min: 600,
            end_min: Some(510),
            service: ServiceKind::Bath,
        };
        let result = h.pipeline.record_booking(&booking, None).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::InvalidTimeRange { .. }))
        ));
        assert!(h.bookings.inserted().is_empty());
    }

    #[tokio::test]
    async fn owner_numbers_match_on_normalized_digits() {
        let owners = OwnerDirectory::new(["(615) 555-0199"], "615-555-0188");
        assert!(owners.is_owner("6155550199"));
        assert!(owners.is_owner("+1 615 555 0188"));
        assert!(!owners.is_owner("6155550101"));
        assert_eq!(owners.primary(), "6155550188");
    }
}
