//! Assembles the two client views the pipeline serves: the compact reply
//! context handed to the drafting model, and the richer dossier shown on the
//! review card.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use barkline_core::domain::{
    minutes_to_display, ClientContext, ClientId, NoteEntry,
};
use barkline_db::repositories::{
    AppointmentRow, BookingRepository, ClientRepository, MessageRepository, RepositoryError,
};

/// Upcoming bookings listed in the reply context.
pub const UPCOMING_LIMIT: u32 = 5;
/// Conversation lines pulled into the reply context, oldest first.
pub const CONVERSATION_TAIL: u32 = 10;
/// Appointment history window the dossier derives preferences from.
pub const HISTORY_WINDOW: u32 = 40;
pub const NOTES_LIMIT: u32 = 10;

/// `2026-09-01` -> `Sep 1`.
fn friendly(date: NaiveDate) -> String {
    format!("{} {}", date.format("%b"), date.day())
}

/// Load everything the drafting prompt needs about one client. `None` when
/// the client row is gone.
pub async fn client_context(
    clients: &dyn ClientRepository,
    bookings: &dyn BookingRepository,
    messages: &dyn MessageRepository,
    client_id: ClientId,
    today: NaiveDate,
) -> Result<Option<ClientContext>, RepositoryError> {
    let Some(client) = clients.find(client_id).await? else { return Ok(None) };

    let pets = clients.pets_for(client_id).await?;
    let upcoming = bookings
        .upcoming_for_client(client_id, today, UPCOMING_LIMIT)
        .await?
        .iter()
        .map(upcoming_line)
        .collect();
    let recent_conversation =
        messages.conversation_tail(client_id, CONVERSATION_TAIL).await?;

    Ok(Some(ClientContext { client, pets, upcoming, recent_conversation }))
}

fn upcoming_line(row: &AppointmentRow) -> String {
    format!(
        "{} at {}: {} ({}, {})",
        row.date,
        minutes_to_display(row.start_min),
        row.pet_name,
        row.groomer_name,
        row.service.display(),
    )
}

/// Render the conversation as the prefixed lines stored on a draft,
/// excluding the trigger message (the last inbound line).
pub fn prior_thread(context: &ClientContext) -> Vec<String> {
    let lines = &context.recent_conversation;
    let keep = lines.len().saturating_sub(1);
    lines[..keep]
        .iter()
        .map(|line| {
            let speaker = if line.from_business { "Us" } else { "Client" };
            format!("{speaker}: {}", line.body)
        })
        .collect()
}

#[derive(Clone, Debug, Serialize)]
pub struct PetDossier {
    pub name: String,
    pub breed: Option<String>,
    pub size: Option<String>,
    pub coat: Option<String>,
    pub age: Option<String>,
    pub last_groom: Option<NaiveDate>,
    pub weeks_since: Option<i64>,
    /// Most common service in the history window.
    pub usual_service: Option<String>,
    /// Only set when one groomer took more than half the visits, with at
    /// least two of them.
    pub usual_groomer: Option<String>,
}

/// The review-card snapshot of a client: pets with derived preferences,
/// visit rhythm, and the most recent notes.
#[derive(Clone, Debug, Serialize)]
pub struct Dossier {
    pub client_id: ClientId,
    pub name: String,
    pub phone: String,
    pub inactive: bool,
    pub warning: Option<String>,
    pub is_new_client: bool,
    pub pets: Vec<PetDossier>,
    /// `Sep 1 (12d ago)` across all pets.
    pub last_visit: Option<String>,
    /// `Sep 15 — Biscuit w/ Tomoko`.
    pub next_appointment: Option<String>,
    pub future_count: i64,
    pub preferred_day: Option<String>,
    pub preferred_time: Option<String>,
    pub avg_cadence_days: Option<f64>,
    /// Offered only when nothing is booked: today plus the average cadence,
    /// snapped forward to the preferred weekday.
    pub suggested_next: Option<String>,
    pub notes: Vec<NoteEntry>,
}

fn pet_age(birthdate: Option<NaiveDate>, today: NaiveDate) -> Option<String> {
    let days = (today - birthdate?).num_days();
    if days >= 365 {
        Some(format!("{}y", days / 365))
    } else if days >= 30 {
        Some(format!("{}mo", days / 30))
    } else {
        None
    }
}

fn modal<'a>(counts: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut tally: Vec<(String, usize)> = Vec::new();
    for value in counts {
        match tally.iter_mut().find(|(existing, _)| existing == value) {
            Some((_, n)) => *n += 1,
            None => tally.push((value.to_string(), 1)),
        }
    }
    tally.sort_by(|a, b| b.1.cmp(&a.1));
    tally
}

fn suggested_next(
    today: NaiveDate,
    cadence_days: f64,
    preferred_day: Option<&str>,
    preferred_time: Option<&str>,
) -> String {
    let mut target = today + Duration::days(cadence_days.round() as i64);
    if let Some(weekday) = preferred_day.and_then(|day| day.parse::<Weekday>().ok()) {
        let snap = (i64::from(weekday.num_days_from_monday())
            - i64::from(target.weekday().num_days_from_monday()))
        .rem_euclid(7);
        target += Duration::days(snap);
    }

    let weeks = (cadence_days / 7.0).round() as i64;
    let day_part = preferred_day.map(|day| format!("{day}, ")).unwrap_or_default();
    let time_part = preferred_time.map(|time| format!(" {time}")).unwrap_or_default();
    format!("{} ({day_part}~{weeks} wks{time_part})", friendly(target))
}

pub async fn build_dossier(
    clients: &dyn ClientRepository,
    bookings: &dyn BookingRepository,
    client_id: ClientId,
    today: NaiveDate,
) -> Result<Option<Dossier>, RepositoryError> {
    let Some(client) = clients.find(client_id).await? else { return Ok(None) };

    let stats = clients.stats_for(client_id).await?;
    let pets = clients.pets_for(client_id).await?;
    let history = bookings.history_for_client(client_id, today, HISTORY_WINDOW).await?;
    let future_count = bookings.future_count(client_id, today).await?;
    let notes = clients.notes_for(client_id, NOTES_LIMIT).await?;

    let mut pet_cards = Vec::with_capacity(pets.len());
    let mut all_last_grooms: Vec<NaiveDate> = Vec::new();

    for pet in &pets {
        let visits: Vec<&AppointmentRow> =
            history.iter().filter(|row| row.pet_id == pet.id).collect();

        let last_groom = visits.iter().map(|row| row.date).max();
        if let Some(date) = last_groom {
            all_last_grooms.push(date);
        }

        let usual_service = modal(visits.iter().map(|row| row.service.display()))
            .first()
            .map(|(service, _)| service.clone());

        let groomer_tally = modal(
            visits
                .iter()
                .map(|row| row.groomer_name.as_str())
                .filter(|name| !name.is_empty()),
        );
        let groomer_total: usize = groomer_tally.iter().map(|(_, n)| n).sum();
        let usual_groomer = groomer_tally.first().and_then(|(name, n)| {
            (*n >= 2 && *n * 2 > groomer_total).then(|| name.clone())
        });

        pet_cards.push(PetDossier {
            name: pet.name.clone(),
            breed: pet.breed.clone(),
            size: pet.size_code.clone(),
            coat: pet.coat_code.clone(),
            age: pet_age(pet.birthdate, today),
            last_groom,
            weeks_since: last_groom.map(|date| (today - date).num_days() / 7),
            usual_service,
            usual_groomer,
        });
    }

    let last_visit = all_last_grooms.iter().max().map(|date| {
        format!("{} ({}d ago)", friendly(*date), (today - *date).num_days())
    });

    let next_appointment =
        bookings.upcoming_for_client(client_id, today, 1).await?.first().map(|row| {
            if row.groomer_name.is_empty() {
                format!("{} — {}", friendly(row.date), row.pet_name)
            } else {
                format!("{} — {} w/ {}", friendly(row.date), row.pet_name, row.groomer_name)
            }
        });

    // new until the stats job has seen them, unless the history says otherwise
    let mut is_new_client = stats
        .as_ref()
        .map_or(true, |stats| stats.visits_12mo.map_or(true, |visits| visits == 0));
    if is_new_client && history.len() > 2 {
        is_new_client = false;
    }

    let avg_cadence_days = stats.as_ref().and_then(|stats| stats.avg_cadence_days);
    let preferred_day = stats.as_ref().and_then(|stats| stats.preferred_day.clone());
    let preferred_time = stats.as_ref().and_then(|stats| stats.preferred_time.clone());

    let suggested = match (future_count, avg_cadence_days) {
        (0, Some(cadence)) => Some(suggested_next(
            today,
            cadence,
            preferred_day.as_deref(),
            preferred_time.as_deref(),
        )),
        _ => None,
    };

    Ok(Some(Dossier {
        client_id,
        name: client.full_name(),
        phone: client.phone,
        inactive: client.inactive,
        warning: client.warning,
        is_new_client,
        pets: pet_cards,
        last_visit,
        next_appointment,
        future_count,
        preferred_day,
        preferred_time,
        avg_cadence_days,
        suggested_next: suggested,
        notes,
    }))
}
