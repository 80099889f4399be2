//! SQLite persistence for the Barkline salon backend: pool setup, embedded
//! migrations, repositories over the booking calendar and message store, and
//! the snapshot store backing pipeline durability.

pub mod connection;
pub mod facts;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_settings, DbPool};
