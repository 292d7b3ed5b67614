use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Granularity view a slot belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotType {
    ThirtyOnly,
    SixtyOnly,
    ThirtyOrSixty,
}

impl SlotType {
    pub const ALL: [SlotType; 3] = [
        SlotType::ThirtyOnly,
        SlotType::SixtyOnly,
        SlotType::ThirtyOrSixty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotType::ThirtyOnly => "30",
            SlotType::SixtyOnly => "60",
            SlotType::ThirtyOrSixty => "30-or-60",
        }
    }

    pub fn parse_type(s: &str) -> Option<Self> {
        match s {
            "30" => Some(SlotType::ThirtyOnly),
            "60" => Some(SlotType::SixtyOnly),
            "30-or-60" => Some(SlotType::ThirtyOrSixty),
            _ => None,
        }
    }
}

/// An open, bookable appointment as handed out by the appointment source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentSlotSource {
    pub appointment_id: i64,
    pub provider_id: i64,
    pub start_at: DateTime<Utc>,
    /// Minutes; 30 or 60 for anything that can back a slot.
    pub duration: i64,
}

/// Builder output before identity and bookkeeping are stamped on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSlot {
    pub slot_type: SlotType,
    pub start_at: DateTime<Utc>,
    pub duration: i64,
    pub appointment_ids: Vec<i64>,
}

/// A persisted row of the derived slot table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleSlot {
    pub slot_id: Uuid,
    pub slot_type: SlotType,
    pub provider_id: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration: i64,
    pub appointment_ids: Vec<i64>,
    pub sync_token: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Result of one provider's synchronization transaction.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderSyncOutcome {
    pub provider_id: i64,
    pub sync_token: Uuid,
    pub upserted: u64,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

/// Aggregate over a whole fleet pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FleetReport {
    pub synced_provider_count: u64,
    pub failed_provider_count: u64,
    pub upserted: u64,
    pub inserted: u64,
    pub updated: u64,
    pub deleted_stale: u64,
    pub deleted_orphaned: u64,
}

impl FleetReport {
    pub fn record(&mut self, outcome: &ProviderSyncOutcome) {
        self.synced_provider_count += 1;
        self.upserted += outcome.upserted;
        self.inserted += outcome.inserted;
        self.updated += outcome.updated;
        self.deleted_stale += outcome.deleted;
    }
}

/// Drop seconds and sub-second precision.
pub fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - Duration::seconds(i64::from(ts.second())) - Duration::nanoseconds(i64::from(ts.nanosecond()))
}
