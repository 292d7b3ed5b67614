//! Derives bookable schedule slots from raw appointments and keeps the persisted
//! slot table reconciled with them.

pub mod assembler;
pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod source;
pub mod sync;

pub use error::{ErrorKind, SyncError};
pub use sync::{allocate_schedule_slots, sync_provider, SyncOptions};
