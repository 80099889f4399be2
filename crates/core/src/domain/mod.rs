pub mod booking;
pub mod client;
pub mod contact;
pub mod draft;
pub mod message;

pub use booking::{
    minutes_to_display, Booking, Groomer, GroomerId, PetId, ServiceKind, STANDARD_DURATION_MIN,
};
pub use client::{Client, ClientContext, ClientId, ClientStats, ConversationLine, NoteEntry, Pet};
pub use contact::{format_phone, normalize_phone};
pub use draft::{Draft, DraftId, EscalationRecord};
pub use message::{InboundMessage, MessageId};
