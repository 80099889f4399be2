//! Core domain for the Barkline salon backend: availability and
//! conflict-detection over the booking calendar, the draft/approve messaging
//! pipeline state, configuration, and the shared error taxonomy.

pub mod availability;
pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pipeline;

pub use cache::TtlCache;
pub use errors::{ApplicationError, DomainError, InterfaceError};
