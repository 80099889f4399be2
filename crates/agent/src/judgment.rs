//! Decides whether an owner reply belongs in the staff knowledge base.

pub const KB_SYSTEM_PROMPT: &str = "You are a knowledge base curator for a pet grooming salon. \
Analyze the owner's text message and determine if it contains a policy, rule, or operational \
fact worth adding to the staff knowledge base.\n\
Respond with ONLY one of these two formats:\n\n\
Format 1 (KB-worthy):\n\
CATEGORY: [one of: Policies, Scheduling, Pricing, Services, Staff, Clients, Other]\n\
CONTENT: [clear, concise statement of the rule or fact]\n\n\
Format 2 (not KB-worthy, such as chitchat, acknowledgment, or already covered):\n\
NOT_KB";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KbJudgment {
    Store { category: String, content: String },
    Skip,
}

/// Builds the user half of the judgment prompt. `kb_head` is the current head
/// of the knowledge base so the model can spot duplicates.
pub fn judgment_prompt(
    owner_reply: &str,
    escalation_context: Option<&str>,
    kb_head: &str,
) -> String {
    let kb_text = if kb_head.trim().is_empty() { "(empty)" } else { kb_head };
    let context_line = match escalation_context {
        Some(question) => {
            format!("\nThis message is a reply to the staff question: \"{question}\"")
        }
        None => String::new(),
    };
    format!(
        "Current knowledge base (first 3000 chars):\n{kb_text}\n\
         {context_line}\n\
         Owner's message: \"{owner_reply}\"\n\n\
         Is this new, useful staff knowledge not already covered? \
         If yes, return CATEGORY and CONTENT. If no, return NOT_KB."
    )
}

fn line_value<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    raw.lines().find_map(|line| line.trim().strip_prefix(key)).map(str::trim)
}

/// Parses the model's judgment. Anything that does not clearly match the
/// KB-worthy format is treated as a skip.
pub fn parse_judgment(raw: &str) -> KbJudgment {
    let trimmed = raw.trim();
    let head: String = trimmed.chars().take(30).collect::<String>().to_uppercase();
    if head.contains("NOT_KB") {
        return KbJudgment::Skip;
    }

    let category = line_value(trimmed, "CATEGORY:");
    let content = match trimmed.find("CONTENT:") {
        // content may run across multiple lines
        Some(index) => Some(trimmed[index + "CONTENT:".len()..].trim()),
        None => None,
    };

    match content {
        Some(content) if !content.is_empty() => KbJudgment::Store {
            category: category
                .filter(|value| !value.is_empty())
                .unwrap_or("General")
                .to_string(),
            content: content.to_string(),
        },
        _ => KbJudgment::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::{judgment_prompt, parse_judgment, KbJudgment};

    #[test]
    fn well_formed_judgment_parses() {
        let raw = "CATEGORY: Pricing\nCONTENT: Handstrip appointments are $120 flat.";
        assert_eq!(
            parse_judgment(raw),
            KbJudgment::Store {
                category: "Pricing".to_string(),
                content: "Handstrip appointments are $120 flat.".to_string(),
            }
        );
    }

    #[test]
    fn multiline_content_is_kept_whole() {
        let raw = "CATEGORY: Scheduling\nCONTENT: No double-booking groomers.\nOne dog per slot.";
        match parse_judgment(raw) {
            KbJudgment::Store { content, .. } => {
                assert!(content.contains("No double-booking"));
                assert!(content.contains("One dog per slot."));
            }
            KbJudgment::Skip => panic!("expected store"),
        }
    }

    #[test]
    fn not_kb_and_garbage_both_skip() {
        assert_eq!(parse_judgment("NOT_KB"), KbJudgment::Skip);
        assert_eq!(parse_judgment("  not_kb, just saying thanks"), KbJudgment::Skip);
        assert_eq!(parse_judgment("sounds good, thanks!"), KbJudgment::Skip);
        assert_eq!(parse_judgment("CATEGORY: Pricing"), KbJudgment::Skip);
        assert_eq!(parse_judgment(""), KbJudgment::Skip);
    }

    #[test]
    fn missing_category_defaults_to_general() {
        let parsed = parse_judgment("CONTENT: We close at noon on Christmas Eve.");
        assert_eq!(
            parsed,
            KbJudgment::Store {
                category: "General".to_string(),
                content: "We close at noon on Christmas Eve.".to_string(),
            }
        );
    }

    #[test]
    fn prompt_includes_context_when_present() {
        let with = judgment_prompt("cash only for new clients", Some("Do we take checks?"), "");
        assert!(with.contains("reply to the staff question"));
        assert!(with.contains("(empty)"));

        let without = judgment_prompt("cash only", None, "# KB\nexisting");
        assert!(!without.contains("reply to the staff question"));
        assert!(without.contains("existing"));
    }
}
