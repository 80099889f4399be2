use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::client::ClientId;
use crate::domain::message::{InboundMessage, MessageId};

/// Identifier for a pending draft. Drafts created from an inbound message use
/// the message id itself; staff-initiated drafts use a short prefixed token so
/// their origin is visible in logs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn short_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Draft {
    pub draft_id: DraftId,
    /// Set when the draft answers a specific inbound message.
    pub message_id: Option<MessageId>,
    pub client_id: Option<ClientId>,
    pub client_name: String,
    pub phone: String,
    pub their_message: String,
    #[serde(default)]
    pub prior_thread: Vec<String>,
    pub draft: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_escalation: bool,
    #[serde(default)]
    pub escalation_context: Option<String>,
}

impl Draft {
    pub fn inbound(
        message: &InboundMessage,
        client_name: String,
        prior_thread: Vec<String>,
        draft_text: String,
    ) -> Self {
        Self {
            draft_id: DraftId(message.id.to_string()),
            message_id: Some(message.id),
            client_id: message.client_id,
            client_name,
            phone: message.phone.clone(),
            their_message: message.body.clone(),
            prior_thread,
            draft: draft_text,
            created_at: Utc::now(),
            is_escalation: false,
            escalation_context: None,
        }
    }

    pub fn composed(
        client_id: ClientId,
        client_name: String,
        phone: String,
        draft_text: String,
    ) -> Self {
        Self {
            draft_id: DraftId(format!("compose-{}", short_token())),
            message_id: None,
            client_id: Some(client_id),
            client_name,
            phone,
            their_message: String::new(),
            prior_thread: Vec::new(),
            draft: draft_text,
            created_at: Utc::now(),
            is_escalation: false,
            escalation_context: None,
        }
    }

    pub fn queued(
        client_id: ClientId,
        client_name: String,
        phone: String,
        draft_text: String,
    ) -> Self {
        Self {
            draft_id: DraftId(format!("manual-{}", short_token())),
            message_id: None,
            client_id: Some(client_id),
            client_name,
            phone,
            their_message: String::new(),
            prior_thread: Vec::new(),
            draft: draft_text,
            created_at: Utc::now(),
            is_escalation: false,
            escalation_context: None,
        }
    }

    /// A question for the salon owner, routed to their personal number.
    pub fn escalation(question: String, context: String, owner_phone: String) -> Self {
        let draft_text = format!("Question from the salon assistant: {question}");
        Self {
            draft_id: DraftId(format!("escalation-{}", short_token())),
            message_id: None,
            client_id: None,
            client_name: "Salon owner".to_string(),
            phone: owner_phone,
            their_message: question,
            prior_thread: Vec::new(),
            draft: draft_text,
            created_at: Utc::now(),
            is_escalation: true,
            escalation_context: Some(context),
        }
    }
}

/// Bookkeeping for an escalation that has been sent to the owner and may
/// still be waiting on their reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub context: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub matched: bool,
}
