use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use slot_allocator::config;
use slot_allocator::db;
use slot_allocator::model::SlotType;

#[derive(Debug, Parser)]
#[command(author, version, about = "Print a provider's derived schedule slots as JSON lines")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Provider whose slots to print
    #[arg(long)]
    provider: i64,

    /// Restrict to one view: 30, 60 or 30-or-60
    #[arg(long)]
    slot_type: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let slot_type = match args.slot_type.as_deref() {
        Some(s) => Some(SlotType::parse_type(s).ok_or_else(|| anyhow!("unknown slot type {s}"))?),
        None => None,
    };

    let cfg = config::load(Some(&args.config))?;
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;

    let slots = db::list_provider_slots(&pool, args.provider, slot_type).await?;
    for slot in &slots {
        println!("{}", serde_json::to_string(slot)?);
    }
    eprintln!("{} slot(s) for provider {}", slots.len(), args.provider);
    Ok(())
}
