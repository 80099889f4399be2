use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ClientId(pub i64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Client {
    pub id: ClientId,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub warning: Option<String>,
    pub inactive: bool,
}

impl Client {
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        full.trim().to_string()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Pet {
    pub id: crate::domain::booking::PetId,
    pub client_id: ClientId,
    pub name: String,
    pub breed: Option<String>,
    pub size_code: Option<String>,
    pub coat_code: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

/// Precomputed visit statistics, refreshed out of band by the salon's
/// reporting job.
#[derive(Clone, Debug, Serialize)]
pub struct ClientStats {
    pub client_id: ClientId,
    pub avg_cadence_days: Option<f64>,
    pub preferred_day: Option<String>,
    pub preferred_time: Option<String>,
    pub visits_12mo: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NoteEntry {
    pub noted_on: Option<NaiveDate>,
    pub subject: Option<String>,
    pub author: Option<String>,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationLine {
    pub from_business: bool,
    pub body: String,
}

/// The compact view of a client handed to the drafting model: who they are,
/// their dogs, what is booked, and the recent thread.
#[derive(Clone, Debug)]
pub struct ClientContext {
    pub client: Client,
    pub pets: Vec<Pet>,
    pub upcoming: Vec<String>,
    pub recent_conversation: Vec<ConversationLine>,
}

impl ClientContext {
    /// Minimal context for a number we cannot match to a client record.
    pub fn unknown(phone: &str) -> Self {
        Self {
            client: Client {
                id: ClientId(0),
                first_name: String::new(),
                last_name: String::new(),
                phone: phone.to_string(),
                warning: None,
                inactive: false,
            },
            pets: Vec::new(),
            upcoming: Vec::new(),
            recent_conversation: Vec::new(),
        }
    }

    pub fn display_name(&self) -> String {
        let name = self.client.full_name();
        if name.is_empty() {
            format!("Unknown ({})", crate::domain::contact::format_phone(&self.client.phone))
        } else {
            name
        }
    }
}
