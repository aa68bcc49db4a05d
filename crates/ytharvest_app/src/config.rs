//! Run settings: RON file defaults, overridden by command-line flags.
//!
//! Every field of the file is optional:
//!
//! ```ron
//! (
//!     key_file: Some("./developer_key"),
//!     checkpoint: Some("./checkpoint.json"),
//!     quota: (budget: 10000, reset_grace_secs: 900),
//!     retry: (short_delay_secs: 30, hard_failures: GiveUp),
//! )
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use ytharvest_core::{
    BackoffSchedule, HardFailurePolicy, HarvestConfig, QuotaSettings, QuotaTracker, RetryPolicy,
};
use ytharvest_engine::ApiSettings;

use crate::cli::Cli;

const DEFAULT_KEY_FILE: &str = "./developer_key";
const DEFAULT_CHECKPOINT: &str = "./checkpoint.json";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    key_file: Option<PathBuf>,
    checkpoint: Option<PathBuf>,
    log_file: Option<PathBuf>,
    api: ApiConfig,
    quota: QuotaConfig,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ApiConfig {
    base_url: String,
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
    max_bytes: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let api = ApiSettings::default();
        Self {
            base_url: api.base_url,
            connect_timeout_secs: api.connect_timeout.as_secs(),
            request_timeout_secs: api.request_timeout.as_secs(),
            max_bytes: api.max_bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct QuotaConfig {
    budget: u64,
    safety_margin: u64,
    reset_window_secs: u64,
    reset_grace_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        let quota = QuotaSettings::default();
        Self {
            budget: quota.budget,
            safety_margin: quota.safety_margin,
            reset_window_secs: quota.reset_window.as_secs(),
            reset_grace_secs: quota.reset_grace.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RetryConfig {
    short_delay_secs: u64,
    short_attempts: u32,
    long_delay_secs: u64,
    long_attempts: u32,
    hard_failures: HardFailurePolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let schedule = BackoffSchedule::default();
        Self {
            short_delay_secs: schedule.short_delay.as_secs(),
            short_attempts: schedule.short_attempts,
            long_delay_secs: schedule.long_delay.as_secs(),
            long_attempts: schedule.long_attempts,
            hard_failures: HardFailurePolicy::default(),
        }
    }
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        ron::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Everything a run needs, after merging file and flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub key_file: PathBuf,
    pub checkpoint: PathBuf,
    pub resume: bool,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
    pub api: ApiSettings,
    pub harvest: HarvestConfig,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(file, cli)
    }

    fn merge(file: FileConfig, cli: &Cli) -> Result<Self> {
        let hard_failures = if cli.no_retry_api_errors {
            HardFailurePolicy::GiveUp
        } else {
            file.retry.hard_failures
        };
        let harvest = HarvestConfig {
            retry: RetryPolicy {
                schedule: BackoffSchedule {
                    short_delay: Duration::from_secs(file.retry.short_delay_secs),
                    short_attempts: file.retry.short_attempts,
                    long_delay: Duration::from_secs(file.retry.long_delay_secs),
                    long_attempts: file.retry.long_attempts,
                },
                hard_failures,
            },
            quota: QuotaSettings {
                budget: file.quota.budget,
                safety_margin: file.quota.safety_margin,
                reset_window: Duration::from_secs(file.quota.reset_window_secs),
                reset_grace: Duration::from_secs(file.quota.reset_grace_secs),
            },
        };
        // Fail at startup rather than at the first request.
        QuotaTracker::new(harvest.quota).context("invalid quota settings")?;

        Ok(Self {
            key_file: cli
                .key_file
                .clone()
                .or(file.key_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_FILE)),
            checkpoint: cli
                .checkpoint
                .clone()
                .or(file.checkpoint)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT)),
            resume: cli.resume,
            log_file: cli.log_file.clone().or(file.log_file),
            verbose: cli.verbose,
            api: ApiSettings {
                base_url: file.api.base_url,
                connect_timeout: Duration::from_secs(file.api.connect_timeout_secs),
                request_timeout: Duration::from_secs(file.api.request_timeout_secs),
                max_bytes: file.api.max_bytes,
            },
            harvest,
        })
    }
}
