use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncSettingsError {
    #[error("debounce must be > 0")]
    InvalidDebounce,

    #[error("max_backoff ({max_backoff:?}) must be at least twice the debounce ({debounce:?})")]
    InvalidMaxBackoff {
        debounce: Duration,
        max_backoff: Duration,
    },

    #[error("degraded_after must be > 0")]
    InvalidDegradedAfter,

    #[error("teardown_timeout must be > 0")]
    InvalidTeardownTimeout,
}

/// Timing of the debounced sync client.
///
/// Retries back off from `2 × debounce`, doubling per consecutive failure up
/// to `max_backoff`. `degraded_after` consecutive failures flip the status to
/// degraded; after `max_retries` scheduled retries the client waits for the
/// next queued action or an explicit flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    debounce: Duration,
    max_backoff: Duration,
    degraded_after: u32,
    max_retries: u32,
    teardown_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            degraded_after: 3,
            max_retries: 8,
            teardown_timeout: Duration::from_secs(2),
        }
    }
}

impl SyncSettings {
    /// Creates validated sync settings.
    ///
    /// # Errors
    ///
    /// Returns `SyncSettingsError` when a duration is zero, `max_backoff` is
    /// shorter than the first retry delay, or `degraded_after` is zero.
    pub fn new(
        debounce: Duration,
        max_backoff: Duration,
        degraded_after: u32,
        max_retries: u32,
        teardown_timeout: Duration,
    ) -> Result<Self, SyncSettingsError> {
        if debounce.is_zero() {
            return Err(SyncSettingsError::InvalidDebounce);
        }
        if max_backoff < debounce.saturating_mul(2) {
            return Err(SyncSettingsError::InvalidMaxBackoff {
                debounce,
                max_backoff,
            });
        }
        if degraded_after == 0 {
            return Err(SyncSettingsError::InvalidDegradedAfter);
        }
        if teardown_timeout.is_zero() {
            return Err(SyncSettingsError::InvalidTeardownTimeout);
        }
        Ok(Self {
            debounce,
            max_backoff,
            degraded_after,
            max_retries,
            teardown_timeout,
        })
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    #[must_use]
    pub fn degraded_after(&self) -> u32 {
        self.degraded_after
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn teardown_timeout(&self) -> Duration {
        self.teardown_timeout
    }

    /// Delay before the retry following `failures` consecutive failures.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let first = self.debounce.saturating_mul(2);
        let shift = failures.saturating_sub(1).min(31);
        first
            .checked_mul(1_u32 << shift)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
