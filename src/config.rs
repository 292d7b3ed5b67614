//! Configuration loader and validator for the slot allocator.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::sync::SyncOptions;

/// Upper bound on rows per upsert statement; keeps binds under SQLite's limit.
pub const MAX_BATCH_SIZE: usize = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub sync: SyncSettings,
    pub appointments: Appointments,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Allocation run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    pub interval_seconds: u64,
    pub batch_size: usize,
    pub appointment_limit: i64,
    pub concurrency: usize,
    pub provider_timeout_seconds: u64,
}

/// Which appointments count as bookable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointments {
    pub bookable_type: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default SQLite location inside `app.data_dir`.
    pub fn database_url(&self) -> String {
        format!("sqlite://{}/slots.db", self.app.data_dir.trim_end_matches('/'))
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            batch_size: self.sync.batch_size,
            appointment_limit: self.sync.appointment_limit,
            concurrency: self.sync.concurrency,
            provider_timeout: Duration::from_secs(self.sync.provider_timeout_seconds),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_seconds)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let s = &cfg.sync;
    if s.interval_seconds == 0 {
        return Err(ConfigError::Invalid("sync.interval_seconds must be > 0"));
    }
    if s.batch_size == 0 || s.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Invalid("sync.batch_size must be within 1..=3000"));
    }
    if s.appointment_limit <= 0 {
        return Err(ConfigError::Invalid("sync.appointment_limit must be > 0"));
    }
    if s.concurrency == 0 {
        return Err(ConfigError::Invalid("sync.concurrency must be > 0"));
    }
    if s.provider_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("sync.provider_timeout_seconds must be > 0"));
    }

    if cfg.appointments.bookable_type.trim().is_empty() {
        return Err(ConfigError::Invalid("appointments.bookable_type must be non-empty"));
    }

    Ok(())
}

/// Example configuration with the reference defaults.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

sync:
  interval_seconds: 300
  batch_size: 500
  appointment_limit: 10000
  concurrency: 1
  provider_timeout_seconds: 60

appointments:
  bookable_type: "standard"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        let opts = cfg.sync_options();
        assert_eq!(opts.batch_size, 500);
        assert_eq!(opts.appointment_limit, 10_000);
        assert_eq!(opts.provider_timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_batch_size() {
        let mut cfg = example_cfg();
        cfg.sync.batch_size = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("batch_size")),
            _ => panic!("wrong error"),
        }

        cfg.sync.batch_size = MAX_BATCH_SIZE + 1;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_sync_settings() {
        let mut cfg = example_cfg();
        cfg.sync.concurrency = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.sync.appointment_limit = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.sync.interval_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.sync.provider_timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_bookable_type() {
        let mut cfg = example_cfg();
        cfg.appointments.bookable_type = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("bookable_type")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
        assert!(cfg.database_url().ends_with("/data/slots.db"));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.appointments.bookable_type, "standard");
        assert_eq!(cfg.sync.concurrency, 1);
    }
}
