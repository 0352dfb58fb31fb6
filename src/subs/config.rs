//! Subscription cache configuration.
//!
//! Controls how many distinct subscriptions the cache keeps alive and how long
//! an untouched one survives, via the `[subs]` table of `barkeep.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;
use time::Duration;

// Default values for subscription cache configuration
const DEFAULT_CAPACITY_LIMIT: usize = 10;
const DEFAULT_EXPIRATION_WINDOW_MINUTES: u64 = 50;

/// Subscription cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubsConfig {
    /// Maximum number of distinct subscriptions tracked at once.
    pub capacity_limit: usize,
    /// Minutes an entry may go untouched before the next epoch drops it.
    pub expiration_window_minutes: u64,
}

impl Default for SubsConfig {
    fn default() -> Self {
        Self {
            capacity_limit: DEFAULT_CAPACITY_LIMIT,
            expiration_window_minutes: DEFAULT_EXPIRATION_WINDOW_MINUTES,
        }
    }
}

impl From<&crate::config::SubsSettings> for SubsConfig {
    fn from(settings: &crate::config::SubsSettings) -> Self {
        Self {
            capacity_limit: settings.capacity_limit.get(),
            expiration_window_minutes: settings.expiration_window_minutes,
        }
    }
}

impl SubsConfig {
    /// Returns the capacity limit as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the expiration window as a duration.
    pub fn expiration_window(&self) -> Duration {
        let minutes = i64::try_from(self.expiration_window_minutes).unwrap_or(i64::MAX / 60);
        Duration::minutes(minutes)
    }
}
