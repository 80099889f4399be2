use std::collections::HashSet;
use std::hash::Hash;

use chrono::{Datelike, NaiveDate, Weekday};

/// A set of calendar facts that may have failed to load.
///
/// When a fact query fails the engine still answers, but with that dimension
/// neutralized: a degraded exclusion set excludes nothing, a degraded
/// inclusion set admits everything. The degraded flag is carried through to
/// responses so callers can tell a real "all clear" from a blind one.
#[derive(Clone, Debug, Default)]
pub struct FactSet<T> {
    values: HashSet<T>,
    degraded: bool,
}

impl<T: Eq + Hash> FactSet<T> {
    pub fn fresh(values: impl IntoIterator<Item = T>) -> Self {
        Self { values: values.into_iter().collect(), degraded: false }
    }

    pub fn degraded() -> Self {
        Self { values: HashSet::new(), degraded: true }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Exclusion semantics: a degraded set excludes nothing.
    pub fn excludes(&self, value: &T) -> bool {
        !self.degraded && self.values.contains(value)
    }

    /// Inclusion semantics: a degraded set admits everything.
    pub fn admits(&self, value: &T) -> bool {
        self.degraded || self.values.contains(value)
    }
}

/// Calendar facts for one groomer over a scan horizon.
#[derive(Clone, Debug)]
pub struct HorizonFacts {
    /// Salon-wide closure dates (holidays, renovation days).
    pub closures: FactSet<NaiveDate>,
    /// Dates this groomer is individually blocked out.
    pub blocked: FactSet<NaiveDate>,
    /// Dates this groomer has a working-day entry on the weekly schedule.
    pub working: FactSet<NaiveDate>,
}

impl HorizonFacts {
    pub fn is_degraded(&self) -> bool {
        self.closures.is_degraded() || self.blocked.is_degraded() || self.working.is_degraded()
    }

    /// Whether appointments can be offered on this date at all. The salon is
    /// dark on Sundays and Mondays regardless of any schedule row.
    pub fn day_open(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sun | Weekday::Mon) {
            return false;
        }
        !self.closures.excludes(&date) && !self.blocked.excludes(&date) && self.working.admits(&date)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{FactSet, HorizonFacts};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn sundays_and_mondays_are_closed_even_when_scheduled() {
        let facts = HorizonFacts {
            closures: FactSet::fresh([]),
            blocked: FactSet::fresh([]),
            working: FactSet::fresh([date(2026, 9, 6), date(2026, 9, 7), date(2026, 9, 8)]),
        };
        assert!(!facts.day_open(date(2026, 9, 6))); // Sunday
        assert!(!facts.day_open(date(2026, 9, 7))); // Monday
        assert!(facts.day_open(date(2026, 9, 8))); // Tuesday
    }

    #[test]
    fn degraded_working_set_admits_every_day() {
        let facts = HorizonFacts {
            closures: FactSet::fresh([]),
            blocked: FactSet::fresh([]),
            working: FactSet::degraded(),
        };
        assert!(facts.day_open(date(2026, 9, 8)));
        assert!(facts.is_degraded());
    }

    #[test]
    fn degraded_closure_set_excludes_nothing() {
        let facts = HorizonFacts {
            closures: FactSet::degraded(),
            blocked: FactSet::fresh([date(2026, 9, 8)]),
            working: FactSet::fresh([date(2026, 9, 8), date(2026, 9, 9)]),
        };
        assert!(!facts.day_open(date(2026, 9, 8))); // still blocked
        assert!(facts.day_open(date(2026, 9, 9)));
    }
}
