use super::model::{AppointmentStatus, NewAppointment, SlotRow};
use crate::error::SyncResult;
use crate::model::{floor_to_minute, AppointmentSlotSource, ScheduleSlot, SlotType};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

const SLOT_COLUMNS: &str = "slot_id, slot_type, provider_id, start_at, end_at, duration_minutes, \
                            appointment_ids, sync_token, updated_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the parent
/// directory exists. Other URLs (including in-memory ones) pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let expanded = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{expanded}?{q}"),
        None => format!("sqlite://{expanded}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Slot store
// ---------------------------------------------------------------------------

/// Upsert one batch on the natural key. Returns `(inserted, updated)`.
///
/// Conflicting rows keep their `slot_id` and key columns; only the id list, end,
/// token and update time are refreshed. A returned id equal to the candidate's
/// fresh id therefore means the row was newly inserted.
#[instrument(skip_all, fields(rows = slots.len()))]
pub async fn upsert_slots_tx(
    tx: &mut Transaction<'_, Sqlite>,
    slots: &[ScheduleSlot],
) -> SyncResult<(u64, u64)> {
    if slots.is_empty() {
        return Ok((0, 0));
    }

    let encoded_ids = slots
        .iter()
        .map(|s| serde_json::to_string(&s.appointment_ids))
        .collect::<Result<Vec<_>, _>>()?;

    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("INSERT INTO schedule_slots ({SLOT_COLUMNS}) "));
    qb.push_values(slots.iter().zip(encoded_ids), |mut b, (slot, ids)| {
        b.push_bind(slot.slot_id.to_string())
            .push_bind(slot.slot_type.as_str())
            .push_bind(slot.provider_id)
            .push_bind(slot.start_at)
            .push_bind(slot.end_at)
            .push_bind(slot.duration)
            .push_bind(ids)
            .push_bind(slot.sync_token.to_string())
            .push_bind(slot.updated_at);
    });
    qb.push(
        " ON CONFLICT (slot_type, provider_id, start_at, duration_minutes) DO UPDATE SET \
           appointment_ids = excluded.appointment_ids, \
           end_at = excluded.end_at, \
           sync_token = excluded.sync_token, \
           updated_at = excluded.updated_at \
         RETURNING slot_id",
    );

    let returned: Vec<String> = qb.build_query_scalar().fetch_all(&mut **tx).await?;
    let fresh: HashSet<String> = slots.iter().map(|s| s.slot_id.to_string()).collect();
    let inserted = returned.iter().filter(|id| fresh.contains(*id)).count() as u64;
    let updated = returned.len() as u64 - inserted;
    Ok((inserted, updated))
}

/// Delete this provider's rows not touched by the run that owns `sync_token`.
#[instrument(skip(tx))]
pub async fn delete_stale_slots_tx(
    tx: &mut Transaction<'_, Sqlite>,
    provider_id: i64,
    sync_token: Uuid,
) -> SyncResult<u64> {
    let res = sqlx::query("DELETE FROM schedule_slots WHERE provider_id = ? AND sync_token <> ?")
        .bind(provider_id)
        .bind(sync_token.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected())
}

/// Delete every slot whose provider is absent from `roster`.
#[instrument(skip_all, fields(roster = roster.len()))]
pub async fn delete_slots_outside_roster(pool: &Pool, roster: &[i64]) -> SyncResult<u64> {
    let roster_json = serde_json::to_string(roster)?;
    let res = sqlx::query(
        "DELETE FROM schedule_slots WHERE provider_id NOT IN (SELECT value FROM json_each(?))",
    )
    .bind(roster_json)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn list_provider_slots(
    pool: &Pool,
    provider_id: i64,
    slot_type: Option<SlotType>,
) -> SyncResult<Vec<ScheduleSlot>> {
    let slot_type = slot_type.map(|t| t.as_str());
    let rows: Vec<SlotRow> = sqlx::query_as(&format!(
        "SELECT {SLOT_COLUMNS} FROM schedule_slots \
         WHERE provider_id = ? AND (? IS NULL OR slot_type = ?) \
         ORDER BY julianday(start_at) ASC, slot_type ASC, duration_minutes ASC"
    ))
    .bind(provider_id)
    .bind(slot_type)
    .bind(slot_type)
    .fetch_all(pool)
    .await?;
    let slots = rows
        .into_iter()
        .map(ScheduleSlot::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(slots)
}

/// Look a slot up by its natural key. `start_at` is floored to the minute first.
#[instrument(skip(pool))]
pub async fn find_slot(
    pool: &Pool,
    slot_type: SlotType,
    provider_id: i64,
    start_at: DateTime<Utc>,
    duration: i64,
) -> SyncResult<Option<ScheduleSlot>> {
    let row: Option<SlotRow> = sqlx::query_as(&format!(
        "SELECT {SLOT_COLUMNS} FROM schedule_slots \
         WHERE slot_type = ? AND provider_id = ? AND start_at = ? AND duration_minutes = ?"
    ))
    .bind(slot_type.as_str())
    .bind(provider_id)
    .bind(floor_to_minute(start_at))
    .bind(duration)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(ScheduleSlot::try_from).transpose()?)
}

pub async fn count_slots(pool: &Pool) -> SyncResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schedule_slots")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Provider roster and appointments
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn active_provider_ids(pool: &Pool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT id FROM providers WHERE active = 1 ORDER BY id ASC")
        .fetch_all(pool)
        .await
        .context("failed to read provider roster")?;
    Ok(ids)
}

/// Open, unfrozen, bookable appointments starting strictly after `now`.
#[instrument(skip(pool, bookable_type))]
pub async fn open_appointments(
    pool: &Pool,
    provider_id: i64,
    bookable_type: &str,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<AppointmentSlotSource>> {
    let rows: Vec<(i64, i64, DateTime<Utc>, i64)> = sqlx::query_as(
        "SELECT id, provider_id, start_at, duration_minutes FROM appointments \
         WHERE provider_id = ? AND status = ? AND frozen = 0 AND appointment_type = ? \
           AND julianday(start_at) > julianday(?) \
         ORDER BY julianday(start_at) ASC, id ASC \
         LIMIT ?",
    )
    .bind(provider_id)
    .bind(AppointmentStatus::Open.as_str())
    .bind(bookable_type)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to read appointments for provider {provider_id}"))?;

    Ok(rows
        .into_iter()
        .map(|(appointment_id, provider_id, start_at, duration)| AppointmentSlotSource {
            appointment_id,
            provider_id,
            start_at,
            duration,
        })
        .collect())
}

pub async fn upsert_provider(pool: &Pool, id: i64, name: &str, active: bool) -> Result<()> {
    sqlx::query(
        "INSERT INTO providers (id, name, active) VALUES (?, ?, ?) \
         ON CONFLICT (id) DO UPDATE SET name = excluded.name, active = excluded.active",
    )
    .bind(id)
    .bind(name)
    .bind(active)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_provider_active(pool: &Pool, id: i64, active: bool) -> Result<()> {
    sqlx::query("UPDATE providers SET active = ? WHERE id = ?")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_appointment(pool: &Pool, appt: &NewAppointment) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO appointments (provider_id, start_at, duration_minutes, status, frozen, appointment_type) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(appt.provider_id)
    .bind(appt.start_at)
    .bind(appt.duration)
    .bind(appt.status.as_str())
    .bind(appt.frozen)
    .bind(&appt.appointment_type)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn set_appointment_status(pool: &Pool, id: i64, status: AppointmentStatus) -> Result<()> {
    sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_appointment(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
