/// Vocabulary that marks a client message as scheduling-related. Matching any
/// of these pulls live availability and the scheduling reference into the
/// drafting prompt; everything else is answered without calendar grounding.
pub const SCHEDULING_KEYWORDS: &[&str] = &[
    "appointment",
    "appt",
    "book",
    "schedule",
    "reschedule",
    "cancel",
    "availability",
    "available",
    "opening",
    "slot",
    "come in",
    "bring",
    "drop off",
    "pick up",
    "pickup",
    "when can",
    "what day",
    "what time",
    "next week",
    "this week",
    "tomorrow",
    "today",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

pub fn mentions_scheduling(text: &str) -> bool {
    let lowered = text.to_lowercase();
    SCHEDULING_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}
