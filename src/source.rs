use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{self, Pool};
use crate::model::AppointmentSlotSource;

/// Read-only view of the appointment system: who is on the roster, and which of
/// their appointments are currently open for booking.
#[async_trait]
pub trait AppointmentSource: Send + Sync {
    async fn active_provider_ids(&self) -> Result<Vec<i64>>;

    /// Open, unfrozen, bookable appointments starting after `now`, ordered by
    /// start then id, at most `limit` of them.
    async fn open_appointments(
        &self,
        provider_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AppointmentSlotSource>>;
}

/// Appointment source backed by the `providers` and `appointments` tables.
#[derive(Debug, Clone)]
pub struct SqlAppointmentSource {
    pool: Pool,
    bookable_type: String,
}

impl SqlAppointmentSource {
    pub fn new(pool: Pool, bookable_type: impl Into<String>) -> Self {
        Self {
            pool,
            bookable_type: bookable_type.into(),
        }
    }
}

#[async_trait]
impl AppointmentSource for SqlAppointmentSource {
    async fn active_provider_ids(&self) -> Result<Vec<i64>> {
        db::active_provider_ids(&self.pool).await
    }

    async fn open_appointments(
        &self,
        provider_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AppointmentSlotSource>> {
        db::open_appointments(&self.pool, provider_id, &self.bookable_type, now, limit).await
    }
}
