//! Database module: row models and SQL repositories.
//!
//! - `model`: row shapes and the source-side records used to seed appointments.
//! - `repo`: SQL-only functions for the slot store, the provider roster and the
//!   appointment table.
//!
//! Callers import from `slot_allocator::db`; the repository API is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{AppointmentStatus, NewAppointment};
