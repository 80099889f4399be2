use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::availability::facts::HorizonFacts;
use crate::domain::booking::{
    minutes_to_display, Booking, ServiceKind, STANDARD_DURATION_MIN,
};

/// Appointment start times offered every working day: 8:30, 10:00, 11:30,
/// and 1:30.
pub const CANONICAL_SLOT_STARTS: [u16; 4] = [510, 600, 690, 810];

/// The 2:30 slot is offered only when a scan explicitly asks for the extended
/// day, and never appears in the compact availability digest.
pub const EXTENDED_SLOT_START: u16 = 870;

/// Horizon and per-groomer cap for the compact digest fed to the drafting
/// model. The cap keeps the digest inside a prompt-friendly size.
pub const COMPACT_HORIZON_DAYS: u32 = 45;
pub const COMPACT_MAX_SLOTS: usize = 8;

pub fn slot_starts(extended: bool) -> Vec<u16> {
    let mut starts = CANONICAL_SLOT_STARTS.to_vec();
    if extended {
        starts.push(EXTENDED_SLOT_START);
    }
    starts
}

#[derive(Clone, Copy, Debug)]
pub struct AvailabilityWindow {
    /// First date scanned, usually tomorrow.
    pub start: NaiveDate,
    pub days: u32,
    pub extended: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub day_of_week: String,
    pub open_slots: Vec<String>,
    pub summary: DaySummary,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub total: usize,
    pub xs: usize,
    pub sm: usize,
    pub md: usize,
    pub lg: usize,
    pub xl: usize,
    pub handstrip: usize,
    pub bath_only: usize,
    pub nails_only: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct OverlapDetail {
    pub time: String,
    pub pet: String,
    pub client: String,
    pub service: ServiceKind,
}

/// A slot the booking screen shows as open even though an appointment window
/// overlaps it. These are exactly the bookings the quick-glance rule misses:
/// rows with a missing end time, or windows that started at an off-grid time.
#[derive(Clone, Debug, Serialize)]
pub struct SlotConflict {
    pub date: NaiveDate,
    pub day_of_week: String,
    pub slot_display: String,
    pub overlaps: Vec<OverlapDetail>,
}

/// The quick-glance rule the booking screen uses: a slot is taken only when
/// some booking starts at or before it and its recorded end is after it. A
/// missing end defaults to the start, so such rows block nothing here.
fn slot_taken_naive(slot: u16, bookings: &[Booking]) -> bool {
    bookings.iter().any(|booking| {
        let end = booking.end_min.unwrap_or(booking.start_min);
        booking.start_min <= slot && slot < end
    })
}

/// The physical-overlap rule: would a standard appointment starting at `slot`
/// collide with this booking's window? A missing end defaults to a standard
/// window here, which is where the two rules diverge.
fn slot_overlaps<'a>(slot: u16, bookings: &'a [Booking]) -> Vec<&'a Booking> {
    let slot_end = slot + STANDARD_DURATION_MIN;
    bookings
        .iter()
        .filter(|booking| {
            let end = booking.end_min.unwrap_or(booking.start_min + STANDARD_DURATION_MIN);
            booking.start_min < slot_end && slot < end
        })
        .collect()
}

fn by_date(bookings: &[Booking]) -> BTreeMap<NaiveDate, Vec<Booking>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<Booking>> = BTreeMap::new();
    for booking in bookings {
        grouped.entry(booking.date).or_default().push(booking.clone());
    }
    grouped
}

fn day_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

/// Scan a groomer's horizon and report the days with at least one open slot,
/// judged by the quick-glance rule the booking screen uses.
pub fn availability(
    facts: &HorizonFacts,
    bookings: &[Booking],
    window: &AvailabilityWindow,
) -> Vec<DayAvailability> {
    let grouped = by_date(bookings);
    let empty: Vec<Booking> = Vec::new();
    let mut days = Vec::new();

    for offset in 0..window.days {
        let date = window.start + Duration::days(i64::from(offset));
        if !facts.day_open(date) {
            continue;
        }

        let day_bookings = grouped.get(&date).unwrap_or(&empty);
        let open_slots: Vec<String> = slot_starts(window.extended)
            .into_iter()
            .filter(|slot| !slot_taken_naive(*slot, day_bookings))
            .map(minutes_to_display)
            .collect();

        if open_slots.is_empty() {
            continue;
        }

        days.push(DayAvailability {
            date,
            day_of_week: day_name(date),
            open_slots,
            summary: day_summary(day_bookings),
        });
    }

    days
}

/// Find slots the booking screen would offer as open while an appointment
/// window physically overlaps them.
pub fn conflict_scan(
    facts: &HorizonFacts,
    bookings: &[Booking],
    window: &AvailabilityWindow,
) -> Vec<SlotConflict> {
    let grouped = by_date(bookings);
    let mut conflicts = Vec::new();

    for offset in 0..window.days {
        let date = window.start + Duration::days(i64::from(offset));
        if !facts.day_open(date) {
            continue;
        }

        let Some(day_bookings) = grouped.get(&date) else { continue };

        for slot in slot_starts(window.extended) {
            if slot_taken_naive(slot, day_bookings) {
                continue;
            }
            let overlapping = slot_overlaps(slot, day_bookings);
            if overlapping.is_empty() {
                continue;
            }
            conflicts.push(SlotConflict {
                date,
                day_of_week: day_name(date),
                slot_display: minutes_to_display(slot),
                overlaps: overlapping
                    .into_iter()
                    .map(|booking| OverlapDetail {
                        time: booking.time_display(),
                        pet: booking.pet_name.clone(),
                        client: booking.client_last_name.clone(),
                        service: booking.service,
                    })
                    .collect(),
            });
        }
    }

    conflicts
}

/// Open canonical slots for the compact digest: no extended slot, capped at
/// [`COMPACT_MAX_SLOTS`] per groomer across the whole horizon.
pub fn compact_open_slots(
    facts: &HorizonFacts,
    bookings: &[Booking],
    start: NaiveDate,
) -> Vec<(NaiveDate, Vec<u16>)> {
    let grouped = by_date(bookings);
    let empty: Vec<Booking> = Vec::new();
    let mut collected = Vec::new();
    let mut total = 0usize;

    for offset in 0..COMPACT_HORIZON_DAYS {
        if total >= COMPACT_MAX_SLOTS {
            break;
        }
        let date = start + Duration::days(i64::from(offset));
        if !facts.day_open(date) {
            continue;
        }

        let day_bookings = grouped.get(&date).unwrap_or(&empty);
        let mut open = Vec::new();
        for slot in CANONICAL_SLOT_STARTS {
            if total >= COMPACT_MAX_SLOTS {
                break;
            }
            if !slot_taken_naive(slot, day_bookings) {
                open.push(slot);
                total += 1;
            }
        }
        if !open.is_empty() {
            collected.push((date, open));
        }
    }

    collected
}

/// Tally a day's bookings by coat size and special service. Size labels come
/// from the point-of-sale system as strings like `MD - Medium`, so matching
/// is by substring.
pub fn day_summary(bookings: &[Booking]) -> DaySummary {
    let mut summary = DaySummary { total: bookings.len(), ..DaySummary::default() };

    for booking in bookings {
        if let Some(size) = &booking.pet_size {
            let size = size.to_ascii_uppercase();
            if size.contains("XS") {
                summary.xs += 1;
            } else if size.contains("SM") {
                summary.sm += 1;
            } else if size.contains("MD") {
                summary.md += 1;
            } else if size.contains("LG") {
                summary.lg += 1;
            } else if size.contains("XL") {
                summary.xl += 1;
            }
        }

        match booking.service {
            ServiceKind::Handstrip => summary.handstrip += 1,
            ServiceKind::Bath => summary.bath_only += 1,
            ServiceKind::Nails => summary.nails_only += 1,
            ServiceKind::FullGroom | ServiceKind::Other => {}
        }
    }

    summary
}
