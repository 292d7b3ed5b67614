use crate::assembler::assemble_slots;
use crate::db::{self, Pool};
use crate::error::{SyncError, SyncResult};
use crate::model::{AppointmentSlotSource, FleetReport, ProviderSyncOutcome};
use crate::source::AppointmentSource;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_APPOINTMENT_LIMIT: i64 = 10_000;

/// Knobs for a fleet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Rows per upsert statement.
    pub batch_size: usize,
    /// Cap on appointments read per provider.
    pub appointment_limit: i64,
    /// Providers synchronized at once.
    pub concurrency: usize,
    /// Budget for one provider's read, build and transaction.
    pub provider_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            appointment_limit: DEFAULT_APPOINTMENT_LIMIT,
            concurrency: 1,
            provider_timeout: Duration::from_secs(60),
        }
    }
}

/// Replace one provider's derived slots with the ones computable from
/// `appointments`.
///
/// Every candidate is upserted under a fresh sync token and the provider's rows
/// carrying any other token are deleted, all inside one transaction. If anything
/// fails the transaction is dropped and rolled back, leaving the previous state.
#[instrument(skip(pool, appointments), fields(count = appointments.len()))]
pub async fn sync_provider(
    pool: &Pool,
    provider_id: i64,
    appointments: &[AppointmentSlotSource],
    batch_size: usize,
) -> SyncResult<ProviderSyncOutcome> {
    let sync_token = Uuid::new_v4();
    let slots = assemble_slots(provider_id, appointments, sync_token, Utc::now())?;

    let mut tx = pool.begin().await?;
    let (mut inserted, mut updated) = (0, 0);
    for chunk in slots.chunks(batch_size.max(1)) {
        let (i, u) = db::upsert_slots_tx(&mut tx, chunk).await?;
        inserted += i;
        updated += u;
    }
    let deleted = db::delete_stale_slots_tx(&mut tx, provider_id, sync_token).await?;
    tx.commit().await?;

    info!(
        provider_id,
        %sync_token,
        inserted,
        updated,
        deleted,
        "provider slots synchronized"
    );
    Ok(ProviderSyncOutcome {
        provider_id,
        sync_token,
        upserted: inserted + updated,
        inserted,
        updated,
        deleted,
    })
}

/// Run the allocation pass over the whole roster.
///
/// Provider failures are logged and counted, never fatal. Slots of providers
/// missing from the roster are removed once every provider pass has finished.
/// Only a roster read failure or a failed cleanup fails the run itself.
#[instrument(skip_all)]
pub async fn allocate_schedule_slots(
    pool: &Pool,
    source: &dyn AppointmentSource,
    opts: &SyncOptions,
) -> SyncResult<FleetReport> {
    let mut roster = source.active_provider_ids().await?;
    roster.sort_unstable();
    roster.dedup();
    info!(providers = roster.len(), concurrency = opts.concurrency, "starting slot allocation");

    let results: Vec<(i64, SyncResult<ProviderSyncOutcome>)> = stream::iter(roster.iter().copied())
        .map(|provider_id| async move {
            (provider_id, sync_one(pool, source, provider_id, opts).await)
        })
        .buffer_unordered(opts.concurrency.max(1))
        .collect()
        .await;

    let mut report = FleetReport::default();
    for (provider_id, result) in results {
        match result {
            Ok(outcome) => report.record(&outcome),
            Err(err) => {
                report.failed_provider_count += 1;
                warn!(provider_id, kind = err.kind().as_str(), ?err, "provider slot sync failed");
            }
        }
    }

    report.deleted_orphaned = db::delete_slots_outside_roster(pool, &roster).await?;

    info!(
        synced = report.synced_provider_count,
        failed = report.failed_provider_count,
        upserted = report.upserted,
        inserted = report.inserted,
        updated = report.updated,
        deleted_stale = report.deleted_stale,
        deleted_orphaned = report.deleted_orphaned,
        "slot allocation finished"
    );
    Ok(report)
}

async fn sync_one(
    pool: &Pool,
    source: &dyn AppointmentSource,
    provider_id: i64,
    opts: &SyncOptions,
) -> SyncResult<ProviderSyncOutcome> {
    tokio::time::timeout(opts.provider_timeout, read_and_sync(pool, source, provider_id, opts))
        .await
        .map_err(|_| SyncError::Timeout(opts.provider_timeout))?
}

async fn read_and_sync(
    pool: &Pool,
    source: &dyn AppointmentSource,
    provider_id: i64,
    opts: &SyncOptions,
) -> SyncResult<ProviderSyncOutcome> {
    let appointments = source
        .open_appointments(provider_id, Utc::now(), opts.appointment_limit)
        .await?;
    sync_provider(pool, provider_id, &appointments, opts.batch_size).await
}
