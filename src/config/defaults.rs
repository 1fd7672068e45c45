/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
use std::time::Duration;

// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./birthday-scheduler.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// Scheduler defaults
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONCILE_PAGE_SIZE: u64 = 100;

// Delivery defaults (attempts=3, exponential backoff from 60s, pool of 5)
pub const DEFAULT_WORKER_CONCURRENCY: usize = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(60);
pub const DEFAULT_REMOVE_ON_COMPLETE: bool = true;
pub const DEFAULT_REMOVE_ON_FAIL: bool = false;

// Reconciliation defaults
pub const DEFAULT_RECONCILIATION_ENABLED: bool = true;
/// Top of every hour (seconds field first, as the `cron` crate expects)
pub const DEFAULT_RECONCILIATION_CRON: &str = "0 0 * * * *";
pub const DEFAULT_RECONCILE_ON_STARTUP: bool = true;
pub const DEFAULT_REMOVE_SUPERSEDED_JOBS: bool = true;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
