use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;

/// Row id of a message in the salon's message store. Ids are monotonically
/// increasing, which is what makes the inbound watermark work.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub id: MessageId,
    pub client_id: Option<ClientId>,
    pub phone: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}
