//! LLM-facing layer: the chat client, the drafting prompts, and the parsers
//! that turn free-form model output into structured decisions.

pub mod compose;
pub mod drafting;
pub mod judgment;
pub mod llm;

pub use compose::{parse_compose, ComposePlan, COMPOSE_SYSTEM_PROMPT};
pub use drafting::{
    clean_reply, regen_prompt, reply_prompt, DraftingInputs, SchedulingGrounding,
    REPLY_SYSTEM_PROMPT,
};
pub use judgment::{judgment_prompt, parse_judgment, KbJudgment, KB_SYSTEM_PROMPT};
pub use llm::{HttpLlmClient, LlmClient};
