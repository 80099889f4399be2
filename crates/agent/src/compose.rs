//! Natural-language compose: turns a staff instruction into a client lookup
//! query plus message text.

use anyhow::{anyhow, Context};
use serde::Deserialize;

pub const COMPOSE_SYSTEM_PROMPT: &str = "You are composing SMS messages for a dog grooming \
salon. Given a natural language instruction, return ONLY valid JSON with exactly two keys: \
{\"client\": \"FirstName LastName  OR  pet:PetName\", \"draft\": \"the SMS text\"} \
SMS voice: start with Hi [FirstName], concise, no emojis, no exclamation marks, use we/us. \
Return ONLY the JSON object, with no explanation and no markdown.";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ComposePlan {
    /// Client lookup query: a name, or `pet:` followed by a pet name.
    pub client: String,
    pub draft: String,
}

/// Parses the compose response, tolerating prose or fences around the JSON
/// object.
pub fn parse_compose(raw: &str) -> anyhow::Result<ComposePlan> {
    let trimmed = raw.trim();
    let plan: ComposePlan = match serde_json::from_str(trimmed) {
        Ok(plan) => plan,
        Err(_) => {
            let start = trimmed.find('{');
            let end = trimmed.rfind('}');
            let (start, end) = match (start, end) {
                (Some(start), Some(end)) if start < end => (start, end),
                _ => return Err(anyhow!("compose response contained no json object")),
            };
            serde_json::from_str(&trimmed[start..=end])
                .context("compose response json did not match the expected shape")?
        }
    };

    if plan.client.trim().is_empty() || plan.draft.trim().is_empty() {
        return Err(anyhow!("compose response was missing client or draft"));
    }
    Ok(ComposePlan {
        client: plan.client.trim().to_string(),
        draft: plan.draft.trim().to_string(),
    })
}
