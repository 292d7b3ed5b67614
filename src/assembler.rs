use crate::builder::{build_sixty_only, build_thirty_only, build_thirty_or_sixty};
use crate::error::{SyncError, SyncResult};
use crate::model::{floor_to_minute, AppointmentSlotSource, ScheduleSlot};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Run all three views over one provider's appointments and stamp the results
/// into persistable slots sharing `sync_token`.
#[instrument(skip(appointments), fields(count = appointments.len()))]
pub fn assemble_slots(
    provider_id: i64,
    appointments: &[AppointmentSlotSource],
    sync_token: Uuid,
    now: DateTime<Utc>,
) -> SyncResult<Vec<ScheduleSlot>> {
    if let Some(foreign) = appointments.iter().find(|a| a.provider_id != provider_id) {
        return Err(SyncError::Service(format!(
            "appointment {} belongs to provider {}, not {}",
            foreign.appointment_id, foreign.provider_id, provider_id
        )));
    }

    let updated_at = floor_to_minute(now);
    let mut partials = build_thirty_only(appointments)?;
    partials.extend(build_sixty_only(appointments)?);
    partials.extend(build_thirty_or_sixty(appointments)?);

    let slots = partials
        .into_iter()
        .map(|partial| {
            let start_at = floor_to_minute(partial.start_at);
            let end_at = start_at
                .checked_add_signed(Duration::minutes(partial.duration))
                .ok_or_else(|| SyncError::Service(format!("slot end out of range for {start_at}")))?;
            if partial.appointment_ids.is_empty() {
                return Err(SyncError::Service(format!(
                    "{} slot at {start_at} has no appointments",
                    partial.slot_type.as_str()
                )));
            }
            Ok(ScheduleSlot {
                slot_id: Uuid::new_v4(),
                slot_type: partial.slot_type,
                provider_id,
                start_at,
                end_at,
                duration: partial.duration,
                appointment_ids: partial.appointment_ids,
                sync_token,
                updated_at,
            })
        })
        .collect::<SyncResult<Vec<_>>>()?;

    debug!(slots = slots.len(), "assembled slots");
    Ok(slots)
}
