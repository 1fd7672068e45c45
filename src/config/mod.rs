use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

use crate::job_scheduling::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
}

/// Scheduler behaviour for lifecycle hooks and reconciliation scans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound for every queue, ledger and record store call
    #[serde(default = "default_operation_timeout", with = "duration")]
    pub operation_timeout: Duration,
    /// Records fetched per page during reconciliation
    #[serde(default = "default_reconcile_page_size")]
    pub reconcile_page_size: u64,
}

/// Queue runtime settings for the delivery worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Jobs processed concurrently per poll
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_poll_interval", with = "duration")]
    pub poll_interval: Duration,
    /// Attempts per job including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay; doubled for every further attempt
    #[serde(default = "default_backoff_base", with = "duration")]
    pub backoff_base: Duration,
    /// Drop jobs from the queue once delivered
    #[serde(default = "default_remove_on_complete")]
    pub remove_on_complete: bool,
    /// Drop jobs from the queue once their attempts are exhausted
    #[serde(default = "default_remove_on_fail")]
    pub remove_on_fail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_reconciliation_enabled")]
    pub enabled: bool,
    /// Six-field cron expression (seconds first)
    #[serde(default = "default_reconciliation_cron")]
    pub cron: String,
    #[serde(default = "default_reconcile_on_startup")]
    pub run_on_startup: bool,
    /// Also remove pending jobs whose key no longer matches the record
    #[serde(default = "default_remove_superseded_jobs")]
    pub remove_superseded_jobs: bool,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_operation_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

fn default_reconcile_page_size() -> u64 {
    DEFAULT_RECONCILE_PAGE_SIZE
}

fn default_worker_concurrency() -> usize {
    DEFAULT_WORKER_CONCURRENCY
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_base() -> Duration {
    DEFAULT_BACKOFF_BASE
}

fn default_remove_on_complete() -> bool {
    DEFAULT_REMOVE_ON_COMPLETE
}

fn default_remove_on_fail() -> bool {
    DEFAULT_REMOVE_ON_FAIL
}

fn default_reconciliation_enabled() -> bool {
    DEFAULT_RECONCILIATION_ENABLED
}

fn default_reconciliation_cron() -> String {
    DEFAULT_RECONCILIATION_CRON.to_string()
}

fn default_reconcile_on_startup() -> bool {
    DEFAULT_RECONCILE_ON_STARTUP
}

fn default_remove_superseded_jobs() -> bool {
    DEFAULT_REMOVE_SUPERSEDED_JOBS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            operation_timeout: default_operation_timeout(),
            reconcile_page_size: default_reconcile_page_size(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            poll_interval: default_poll_interval(),
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            remove_on_complete: default_remove_on_complete(),
            remove_on_fail: default_remove_on_fail(),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconciliation_enabled(),
            cron: default_reconciliation_cron(),
            run_on_startup: default_reconcile_on_startup(),
            remove_superseded_jobs: default_remove_superseded_jobs(),
        }
    }
}

impl DeliveryConfig {
    /// Retry policy attached to newly scheduled jobs
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, self.backoff_base)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let config: Self = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)
                .with_context(|| format!("Failed to read config file {config_file}"))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {config_file}"))?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.delivery.worker_concurrency == 0 {
            bail!("delivery.worker_concurrency must be at least 1");
        }
        if self.delivery.max_attempts == 0 {
            bail!("delivery.max_attempts must be at least 1");
        }
        if self.delivery.poll_interval.is_zero() {
            bail!("delivery.poll_interval must be greater than zero");
        }
        if self.scheduler.reconcile_page_size == 0 {
            bail!("scheduler.reconcile_page_size must be at least 1");
        }
        if self.scheduler.operation_timeout.is_zero() {
            bail!("scheduler.operation_timeout must be greater than zero");
        }
        cron::Schedule::from_str(&self.reconciliation.cron).with_context(|| {
            format!(
                "reconciliation.cron '{}' is not a valid cron expression",
                self.reconciliation.cron
            )
        })?;
        Ok(())
    }
}
