//! Prompt assembly for client-facing SMS drafts.

use std::fmt::Write;

use barkline_core::domain::ClientContext;

/// Most recent conversation lines included in a prompt.
const CONVERSATION_WINDOW: usize = 8;
/// Per-line cap; old threads can carry very long messages.
const CONVERSATION_LINE_CHARS: usize = 120;

pub const REPLY_SYSTEM_PROMPT: &str = "You are drafting SMS replies for a dog grooming salon. \
Write as the owner of a small family business, direct and friendly, the way a real person texts. \
Style rules: start with 'Hi [FirstName]', no emojis, no exclamation marks, no 'I'd be happy to', \
no 'Great news', no corporate filler. Short sentences. Say what you mean. \
For appointment requests: offer at most ONE or TWO specific slots, not a menu of options. \
Pick the best fit and offer it. Only use slots from the REAL OPEN SLOTS list, never invent times. \
Respond with ONLY the message text: no quotes, no label, no explanation.";

/// Live scheduling material attached to the prompt when the message looks
/// appointment-related.
pub struct SchedulingGrounding<'a> {
    /// Compact open-slot digest, one line per groomer.
    pub availability: &'a str,
    /// Head of the staff scheduling reference document.
    pub reference_doc: &'a str,
}

pub struct DraftingInputs<'a> {
    pub context: &'a ClientContext,
    pub their_message: &'a str,
    pub grounding: Option<&'a SchedulingGrounding<'a>>,
}

fn pet_label(name: &str, breed: Option<&str>) -> String {
    match breed {
        Some(breed) if !breed.is_empty() => format!("{name} ({breed})"),
        _ => name.to_string(),
    }
}

fn context_block(context: &ClientContext) -> String {
    let pets = if context.pets.is_empty() {
        "no pets on file".to_string()
    } else {
        context
            .pets
            .iter()
            .map(|pet| pet_label(&pet.name, pet.breed.as_deref()))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let upcoming = if context.upcoming.is_empty() {
        "none upcoming".to_string()
    } else {
        context.upcoming.join("; ")
    };
    let conversation = if context.recent_conversation.is_empty() {
        "No recent messages".to_string()
    } else {
        let lines = &context.recent_conversation;
        let window = &lines[lines.len().saturating_sub(CONVERSATION_WINDOW)..];
        window
            .iter()
            .map(|line| {
                let speaker = if line.from_business { "Us" } else { "Client" };
                let body: String = line.body.chars().take(CONVERSATION_LINE_CHARS).collect();
                format!("{speaker}: {body}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut block = String::new();
    let _ = writeln!(block, "Client: {}", context.display_name());
    if let Some(warning) = &context.client.warning {
        let _ = writeln!(block, "Account warning: {warning}");
    }
    let _ = writeln!(block, "Pets: {pets}");
    let _ = writeln!(block, "Upcoming appointments: {upcoming}");
    let _ = write!(block, "Recent conversation:\n{conversation}");
    block
}

fn grounding_block(grounding: Option<&SchedulingGrounding<'_>>) -> (String, String) {
    match grounding {
        Some(grounding) => (
            format!(
                "\n\nREAL OPEN SLOTS (use these exact dates/times when proposing):\n{}",
                grounding.availability
            ),
            format!("\n\nSCHEDULING RULES:\n{}", grounding.reference_doc),
        ),
        None => (String::new(), String::new()),
    }
}

/// Returns (system, user) for a first draft of a reply.
pub fn reply_prompt(inputs: &DraftingInputs<'_>) -> (String, String) {
    let (availability, rules) = grounding_block(inputs.grounding);
    let system = format!("{REPLY_SYSTEM_PROMPT}{rules}");
    let user = format!(
        "{}{availability}\n\nThey just wrote: \"{}\"\n\nDraft a reply.",
        context_block(inputs.context),
        inputs.their_message,
    );
    (system, user)
}

/// Returns (system, user) for revising a draft against reviewer feedback.
pub fn regen_prompt(
    inputs: &DraftingInputs<'_>,
    previous_draft: &str,
    feedback: &str,
) -> (String, String) {
    let (availability, rules) = grounding_block(inputs.grounding);
    let system = format!("{REPLY_SYSTEM_PROMPT}{rules}");
    let user = format!(
        "{}{availability}\n\nThey just wrote: \"{}\"\n\nPrevious draft: \"{previous_draft}\"\n\
         User feedback: {feedback}\n\nRevise the draft based on the feedback.",
        context_block(inputs.context),
        inputs.their_message,
    );
    (system, user)
}

/// Strips wrapping the model sometimes adds despite the prompt: surrounding
/// quotes and a leading `Draft:`/`Reply:` label.
pub fn clean_reply(raw: &str) -> String {
    let mut text = raw.trim();
    for label in ["Draft:", "Reply:", "Message:"] {
        if let Some(rest) = text.strip_prefix(label) {
            text = rest.trim_start();
        }
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = &text[1..text.len() - 1];
    }
    text.trim().to_string()
}
