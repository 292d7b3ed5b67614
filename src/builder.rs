//! Slot view builders.
//!
//! Each builder takes one provider's open appointments and derives the slots of a
//! single view. They share one forward scan over the appointments sorted by start
//! time, longest duration first, then id. Once a slot is emitted the scan skips every
//! appointment starting before the slot's end minus one minute, which is also what
//! collapses duplicate appointments at the same instant onto a single contributor.

use crate::error::{SyncError, SyncResult};
use crate::model::{floor_to_minute, AppointmentSlotSource, PartialSlot, SlotType};
use chrono::{DateTime, Duration, Timelike, Utc};

const HALF_HOUR: i64 = 30;
const HOUR: i64 = 60;
/// Largest tolerated gap between the halves of a merged hour.
const MAX_MERGE_GAP: i64 = 1;

/// Slot length in minutes plus the contributing appointment ids.
type Coverage = (i64, Vec<i64>);

/// Standalone 30-minute slots only; nothing is merged.
pub fn build_thirty_only(appointments: &[AppointmentSlotSource]) -> SyncResult<Vec<PartialSlot>> {
    scan(appointments, SlotType::ThirtyOnly, |sorted, i| {
        Ok(half_hour_coverage(&sorted[i]))
    })
}

/// Hour slots: a 60-minute appointment, or a contiguous :00/:30 pair of 30s.
pub fn build_sixty_only(appointments: &[AppointmentSlotSource]) -> SyncResult<Vec<PartialSlot>> {
    scan(appointments, SlotType::SixtyOnly, |sorted, i| {
        Ok(hour_coverage(sorted, i)?.map(|ids| (HOUR, ids)))
    })
}

/// Best available coverage: an hour where possible, otherwise a half hour.
pub fn build_thirty_or_sixty(
    appointments: &[AppointmentSlotSource],
) -> SyncResult<Vec<PartialSlot>> {
    scan(appointments, SlotType::ThirtyOrSixty, |sorted, i| {
        match hour_coverage(sorted, i)? {
            Some(ids) => Ok(Some((HOUR, ids))),
            None => Ok(half_hour_coverage(&sorted[i])),
        }
    })
}

fn scan<F>(
    appointments: &[AppointmentSlotSource],
    slot_type: SlotType,
    mut pick: F,
) -> SyncResult<Vec<PartialSlot>>
where
    F: FnMut(&[AppointmentSlotSource], usize) -> SyncResult<Option<Coverage>>,
{
    let sorted = normalize(appointments);
    let mut slots = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let Some((duration, appointment_ids)) = pick(&sorted, i)? else {
            i += 1;
            continue;
        };
        let start_at = sorted[i].start_at;
        let cutoff = end_of(start_at, duration)? - Duration::minutes(1);
        slots.push(PartialSlot {
            slot_type,
            start_at,
            duration,
            appointment_ids,
        });
        i += 1 + sorted[i + 1..].partition_point(|a| a.start_at < cutoff);
    }
    Ok(slots)
}

fn normalize(appointments: &[AppointmentSlotSource]) -> Vec<AppointmentSlotSource> {
    let mut sorted: Vec<AppointmentSlotSource> = appointments
        .iter()
        .map(|a| AppointmentSlotSource {
            start_at: floor_to_minute(a.start_at),
            ..a.clone()
        })
        .collect();
    sorted.sort_by(|a, b| {
        a.start_at
            .cmp(&b.start_at)
            .then(b.duration.cmp(&a.duration))
            .then(a.appointment_id.cmp(&b.appointment_id))
    });
    sorted
}

fn half_hour_coverage(appt: &AppointmentSlotSource) -> Option<Coverage> {
    (appt.duration == HALF_HOUR && appt.start_at.minute() % 30 == 0)
        .then(|| (HALF_HOUR, vec![appt.appointment_id]))
}

fn hour_coverage(sorted: &[AppointmentSlotSource], i: usize) -> SyncResult<Option<Vec<i64>>> {
    let first = &sorted[i];
    if first.start_at.minute() != 0 {
        return Ok(None);
    }
    if first.duration == HOUR {
        return Ok(Some(vec![first.appointment_id]));
    }
    if first.duration != HALF_HOUR {
        return Ok(None);
    }

    let first_end = end_of(first.start_at, HALF_HOUR)?;
    let latest = end_of(first_end, MAX_MERGE_GAP)?;
    let partner = sorted[i + 1..]
        .iter()
        .take_while(|a| a.start_at <= latest)
        .find(|a| a.duration == HALF_HOUR && a.start_at.minute() == 30 && a.start_at >= first_end);
    Ok(partner.map(|second| vec![first.appointment_id, second.appointment_id]))
}

fn end_of(start: DateTime<Utc>, minutes: i64) -> SyncResult<DateTime<Utc>> {
    start
        .checked_add_signed(Duration::minutes(minutes))
        .ok_or_else(|| SyncError::Service(format!("{start} + {minutes}m is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 7, h, m, 0).unwrap()
    }

    fn appt(id: i64, h: u32, m: u32, duration: i64) -> AppointmentSlotSource {
        AppointmentSlotSource {
            appointment_id: id,
            provider_id: 7,
            start_at: at(h, m),
            duration,
        }
    }

    fn summary(slots: &[PartialSlot]) -> Vec<(DateTime<Utc>, i64, Vec<i64>)> {
        slots
            .iter()
            .map(|s| (s.start_at, s.duration, s.appointment_ids.clone()))
            .collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(build_thirty_only(&[]).unwrap().is_empty());
        assert!(build_sixty_only(&[]).unwrap().is_empty());
        assert!(build_thirty_or_sixty(&[]).unwrap().is_empty());
    }

    #[test]
    fn back_to_back_half_hours() {
        let input = vec![appt(1, 10, 0, 30), appt(2, 10, 30, 30)];

        let thirty = build_thirty_only(&input).unwrap();
        assert_eq!(
            summary(&thirty),
            vec![(at(10, 0), 30, vec![1]), (at(10, 30), 30, vec![2])]
        );
        assert!(thirty.iter().all(|s| s.slot_type == SlotType::ThirtyOnly));

        let sixty = build_sixty_only(&input).unwrap();
        assert_eq!(summary(&sixty), vec![(at(10, 0), 60, vec![1, 2])]);

        let flexible = build_thirty_or_sixty(&input).unwrap();
        assert_eq!(summary(&flexible), vec![(at(10, 0), 60, vec![1, 2])]);
        assert_eq!(flexible[0].slot_type, SlotType::ThirtyOrSixty);
    }

    #[test]
    fn back_to_back_hours() {
        let input = vec![appt(1, 10, 0, 60), appt(2, 11, 0, 60)];
        let expected = vec![(at(10, 0), 60, vec![1]), (at(11, 0), 60, vec![2])];

        assert!(build_thirty_only(&input).unwrap().is_empty());
        assert_eq!(summary(&build_sixty_only(&input).unwrap()), expected);
        assert_eq!(summary(&build_thirty_or_sixty(&input).unwrap()), expected);
    }

    #[test]
    fn hour_appointment_beats_mergeable_pair() {
        let input = vec![appt(1, 10, 0, 30), appt(2, 10, 30, 30), appt(3, 10, 0, 60)];

        assert_eq!(
            summary(&build_sixty_only(&input).unwrap()),
            vec![(at(10, 0), 60, vec![3])]
        );
        assert_eq!(
            summary(&build_thirty_or_sixty(&input).unwrap()),
            vec![(at(10, 0), 60, vec![3])]
        );
        assert_eq!(build_thirty_only(&input).unwrap().len(), 2);
    }

    #[test]
    fn unaligned_appointments_contribute_nothing() {
        let input = vec![appt(1, 10, 2, 30), appt(2, 10, 58, 30), appt(3, 12, 2, 60)];
        assert!(build_thirty_only(&input).unwrap().is_empty());
        assert!(build_sixty_only(&input).unwrap().is_empty());
        assert!(build_thirty_or_sixty(&input).unwrap().is_empty());
    }

    #[test]
    fn duplicates_collapse_to_lowest_id() {
        let input = vec![appt(5, 9, 0, 30), appt(4, 9, 0, 30), appt(9, 11, 0, 60), appt(8, 11, 0, 60)];

        assert_eq!(
            summary(&build_thirty_only(&input).unwrap()),
            vec![(at(9, 0), 30, vec![4])]
        );
        assert_eq!(
            summary(&build_sixty_only(&input).unwrap()),
            vec![(at(11, 0), 60, vec![8])]
        );
        assert_eq!(
            summary(&build_thirty_or_sixty(&input).unwrap()),
            vec![(at(9, 0), 30, vec![4]), (at(11, 0), 60, vec![8])]
        );
    }

    #[test]
    fn lone_top_of_hour_half_hour() {
        let input = vec![appt(1, 14, 0, 30)];
        assert!(build_sixty_only(&input).unwrap().is_empty());
        assert_eq!(
            summary(&build_thirty_or_sixty(&input).unwrap()),
            vec![(at(14, 0), 30, vec![1])]
        );
    }

    #[test]
    fn half_hours_across_an_hour_boundary_do_not_merge() {
        // :30 then the next :00 is contiguous but not hour-aligned.
        let input = vec![appt(1, 10, 30, 30), appt(2, 11, 0, 30)];
        assert!(build_sixty_only(&input).unwrap().is_empty());
        assert_eq!(
            summary(&build_thirty_or_sixty(&input).unwrap()),
            vec![(at(10, 30), 30, vec![1]), (at(11, 0), 30, vec![2])]
        );
    }

    #[test]
    fn pair_with_gap_is_not_merged() {
        let input = vec![appt(1, 10, 0, 30), appt(2, 11, 30, 30)];
        assert!(build_sixty_only(&input).unwrap().is_empty());
        assert_eq!(build_thirty_or_sixty(&input).unwrap().len(), 2);
    }

    #[test]
    fn sub_minute_jitter_is_ignored() {
        let clean = vec![appt(1, 10, 0, 30), appt(2, 10, 30, 30)];
        let mut jittered = clean.clone();
        jittered[0].start_at += Duration::seconds(1);
        jittered[1].start_at += Duration::milliseconds(59_999);

        assert_eq!(build_thirty_only(&clean).unwrap(), build_thirty_only(&jittered).unwrap());
        assert_eq!(build_sixty_only(&clean).unwrap(), build_sixty_only(&jittered).unwrap());
        assert_eq!(
            build_thirty_or_sixty(&clean).unwrap(),
            build_thirty_or_sixty(&jittered).unwrap()
        );
    }

    #[test]
    fn unsupported_durations_are_skipped() {
        let input = vec![appt(1, 10, 0, 45), appt(2, 11, 0, 90)];
        assert!(build_thirty_only(&input).unwrap().is_empty());
        assert!(build_sixty_only(&input).unwrap().is_empty());
        assert!(build_thirty_or_sixty(&input).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_end_is_a_service_error() {
        let start = floor_to_minute(DateTime::<Utc>::MAX_UTC) - Duration::minutes(59);
        let input = vec![AppointmentSlotSource {
            appointment_id: 1,
            provider_id: 7,
            start_at: start,
            duration: 60,
        }];
        let err = build_sixty_only(&input).unwrap_err();
        assert!(matches!(err, SyncError::Service(_)));
    }
}
