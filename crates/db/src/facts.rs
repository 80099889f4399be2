//! Loads calendar facts for the availability engine. A fact source that
//! fails to load is swapped for a degraded placeholder so the engine still
//! answers, with the degraded flag carried through to the response.

use chrono::NaiveDate;
use tracing::warn;

use barkline_core::availability::{FactSet, HorizonFacts};
use barkline_core::domain::GroomerId;

use crate::repositories::ScheduleRepository;

/// Load one groomer's blocked and working dates for a horizon. Closures are
/// salon-wide, so callers fetch them once (and may cache them) and pass the
/// same set in for every groomer scanned.
pub async fn load_horizon_facts(
    schedule: &dyn ScheduleRepository,
    groomer_id: GroomerId,
    start: NaiveDate,
    end: NaiveDate,
    closures: FactSet<NaiveDate>,
) -> HorizonFacts {
    let blocked = match schedule.blocked_between(groomer_id, start, end).await {
        Ok(dates) => FactSet::fresh(dates),
        Err(error) => {
            warn!(
                event_name = "facts.blocked.degraded",
                groomer_id = groomer_id.0,
                %error,
                "blocked dates unavailable"
            );
            FactSet::degraded()
        }
    };

    let working = match schedule.working_days(groomer_id, start, end).await {
        Ok(dates) => FactSet::fresh(dates),
        Err(error) => {
            warn!(
                event_name = "facts.working.degraded",
                groomer_id = groomer_id.0,
                %error,
                "working days unavailable"
            );
            FactSet::degraded()
        }
    };

    HorizonFacts { closures, blocked, working }
}
