use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use slot_allocator::config;
use slot_allocator::db;
use slot_allocator::source::SqlAppointmentSource;
use slot_allocator::sync::allocate_schedule_slots;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Derive schedule slots from open appointments on a fixed interval"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run a single allocation pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let source = SqlAppointmentSource::new(pool.clone(), cfg.appointments.bookable_type.clone());
    let opts = cfg.sync_options();

    if args.once {
        allocate_schedule_slots(&pool, &source, &opts).await?;
        return Ok(());
    }

    // One pass at a time: a slow pass delays the next tick instead of overlapping it.
    let mut ticker = tokio::time::interval(cfg.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = cfg.sync.interval_seconds, "starting slot allocator");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = allocate_schedule_slots(&pool, &source, &opts).await {
                    error!(?err, "slot allocation run failed");
                }
            }
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
    }

    pool.close().await;
    Ok(())
}
