//! Engine configuration.
//!
//! `EngineConfig` carries everything the sync engine needs besides its
//! collaborators: identity (device + tenant), batching limits, the default
//! conflict strategy, retry policy and auto-sync cadence. Hosts build it with
//! the `with_*` helpers and call [`EngineConfig::validate`] before use.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::ResolutionStrategy;
use crate::util::{duration_millis, normalize_text_option};

/// Operations per upload request
pub const DEFAULT_UPLOAD_BATCH_SIZE: usize = 20;
/// Changes per download request
pub const DEFAULT_DOWNLOAD_LIMIT: usize = 100;
/// Auto-sync cadence when the host does not pick one
pub const DEFAULT_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(30);
/// How long acknowledged operations stay in the local queue
pub const DEFAULT_PROCESSED_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Backoff applied to operations the server rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for the exponential delay
    pub max_delay: Duration,
    /// Failures after which an operation is dead-lettered
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying an operation that has failed `attempts` times
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether an operation with `attempts` failures should be dead-lettered
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Configuration for one engine instance (one device, one tenant)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Stable per installation
    pub device_id: String,
    pub tenant_id: String,
    pub upload_batch_size: usize,
    pub download_limit: usize,
    /// Applied to conflicts the server sends without a strategy
    pub conflict_resolution: ResolutionStrategy,
    pub retry: RetryPolicy,
    pub auto_sync_interval: Duration,
    /// Delay before a newly queued operation becomes eligible for upload
    pub debounce: Duration,
    /// Processed operations older than this are pruned after a cycle
    pub processed_retention: Duration,
}

impl EngineConfig {
    /// Create a configuration with default limits
    pub fn new(device_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            tenant_id: tenant_id.into(),
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
            download_limit: DEFAULT_DOWNLOAD_LIMIT,
            conflict_resolution: ResolutionStrategy::default(),
            retry: RetryPolicy::default(),
            auto_sync_interval: DEFAULT_AUTO_SYNC_INTERVAL,
            debounce: Duration::ZERO,
            processed_retention: DEFAULT_PROCESSED_RETENTION,
        }
    }

    #[must_use]
    pub const fn with_upload_batch_size(mut self, size: usize) -> Self {
        self.upload_batch_size = size;
        self
    }

    #[must_use]
    pub const fn with_download_limit(mut self, limit: usize) -> Self {
        self.download_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_conflict_resolution(mut self, strategy: ResolutionStrategy) -> Self {
        self.conflict_resolution = strategy;
        self
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub const fn with_processed_retention(mut self, retention: Duration) -> Self {
        self.processed_retention = retention;
        self
    }

    /// Trim identifiers and reject values the engine cannot work with
    pub fn validate(mut self) -> Result<Self> {
        self.device_id = normalize_text_option(Some(self.device_id))
            .ok_or_else(|| Error::Config("device_id must not be empty".into()))?;
        self.tenant_id = normalize_text_option(Some(self.tenant_id))
            .ok_or_else(|| Error::Config("tenant_id must not be empty".into()))?;
        if self.upload_batch_size == 0 {
            return Err(Error::Config("upload_batch_size must be positive".into()));
        }
        if self.download_limit == 0 {
            return Err(Error::Config("download_limit must be positive".into()));
        }
        if self.auto_sync_interval.is_zero() {
            return Err(Error::Config("auto_sync_interval must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry max_attempts must be positive".into()));
        }
        Ok(self)
    }

    /// Debounce in milliseconds, saturating
    pub fn debounce_ms(&self) -> i64 {
        duration_millis(self.debounce)
    }

    pub fn processed_retention_ms(&self) -> i64 {
        duration_millis(self.processed_retention)
    }
}
