use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A standard grooming appointment occupies a 90-minute window.
pub const STANDARD_DURATION_MIN: u16 = 90;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroomerId(pub i64);

impl fmt::Display for GroomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PetId(pub i64);

impl fmt::Display for PetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Groomer {
    pub id: GroomerId,
    pub name: String,
    /// Free-form constraint shown alongside availability, e.g. "handstrip
    /// only" or "prefers LG/XL dogs".
    pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    FullGroom,
    Bath,
    Nails,
    Handstrip,
    Other,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullGroom => "full_groom",
            Self::Bath => "bath",
            Self::Nails => "nails",
            Self::Handstrip => "handstrip",
            Self::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "full_groom" | "full" | "groom" => Self::FullGroom,
            "bath" | "bath_only" => Self::Bath,
            "nails" | "nails_only" => Self::Nails,
            "handstrip" | "hand_strip" => Self::Handstrip,
            _ => Self::Other,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::FullGroom => "full groom",
            Self::Bath => "bath",
            Self::Nails => "nails",
            Self::Handstrip => "handstrip",
            Self::Other => "service",
        }
    }
}

/// One appointment on a groomer's calendar, with enough joined-in detail to
/// describe it in a conflict report or a day summary.
#[derive(Clone, Debug, Serialize)]
pub struct Booking {
    pub date: NaiveDate,
    pub start_min: u16,
    /// `None` means the end was never recorded. The two occupancy rules
    /// default it differently; see the availability engine.
    pub end_min: Option<u16>,
    pub groomer_id: GroomerId,
    pub pet_name: String,
    pub client_last_name: String,
    pub pet_size: Option<String>,
    pub service: ServiceKind,
}

impl Booking {
    /// An end at or before the start is stored bad data; normalize it to the
    /// standard window so both occupancy rules see a sane interval.
    pub fn new(
        date: NaiveDate,
        start_min: u16,
        end_min: Option<u16>,
        groomer_id: GroomerId,
        pet_name: String,
        client_last_name: String,
        pet_size: Option<String>,
        service: ServiceKind,
    ) -> Self {
        let end_min = end_min.map(|end| {
            if end <= start_min {
                start_min + STANDARD_DURATION_MIN
            } else {
                end
            }
        });
        Self { date, start_min, end_min, groomer_id, pet_name, client_last_name, pet_size, service }
    }

    pub fn time_display(&self) -> String {
        minutes_to_display(self.start_min)
    }
}

/// Render minutes-after-midnight as a 12-hour clock time, e.g. `690` ->
/// `11:30 AM`.
pub fn minutes_to_display(minutes: u16) -> String {
    let hour24 = minutes / 60;
    let minute = minutes % 60;
    let meridiem = if hour24 >= 12 { "PM" } else { "AM" };
    let hour = match hour24 % 12 {
        0 => 12,
        other => other,
    };
    format!("{hour}:{minute:02} {meridiem}")
}
