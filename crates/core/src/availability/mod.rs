pub mod engine;
pub mod facts;

pub use engine::{
    availability, compact_open_slots, conflict_scan, day_summary, slot_starts, AvailabilityWindow,
    DayAvailability, DaySummary, OverlapDetail, SlotConflict, CANONICAL_SLOT_STARTS,
    COMPACT_HORIZON_DAYS, COMPACT_MAX_SLOTS, EXTENDED_SLOT_START,
};
pub use facts::{FactSet, HorizonFacts};
