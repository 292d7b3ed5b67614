//! Row models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use crate::model::{ScheduleSlot, SlotType};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle state of a raw appointment. Only `Open` appointments back slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentStatus {
    Open,
    Booked,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Open => "open",
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

/// Appointment record as written into the source table.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub provider_id: i64,
    pub start_at: DateTime<Utc>,
    pub duration: i64,
    pub status: AppointmentStatus,
    pub frozen: bool,
    pub appointment_type: String,
}

impl NewAppointment {
    /// An open, unfrozen appointment of the default bookable type.
    pub fn open(provider_id: i64, start_at: DateTime<Utc>, duration: i64) -> Self {
        Self {
            provider_id,
            start_at,
            duration,
            status: AppointmentStatus::Open,
            frozen: false,
            appointment_type: "standard".to_string(),
        }
    }
}

/// `schedule_slots` row as stored; ids and the id list are kept as text.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SlotRow {
    pub slot_id: String,
    pub slot_type: String,
    pub provider_id: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub appointment_ids: String,
    pub sync_token: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SlotRow> for ScheduleSlot {
    type Error = sqlx::Error;

    fn try_from(row: SlotRow) -> Result<Self, Self::Error> {
        let slot_type = SlotType::parse_type(&row.slot_type).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown slot type {}", row.slot_type).into())
        })?;
        Ok(ScheduleSlot {
            slot_id: Uuid::parse_str(&row.slot_id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            slot_type,
            provider_id: row.provider_id,
            start_at: row.start_at,
            end_at: row.end_at,
            duration: row.duration_minutes,
            appointment_ids: serde_json::from_str(&row.appointment_ids)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            sync_token: Uuid::parse_str(&row.sync_token)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            updated_at: row.updated_at,
        })
    }
}
