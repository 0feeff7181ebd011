//! Quota Configuration
//!
//! Limits and windows for tiered download quotas.

use anyhow::Result;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::reset::ResetPolicy;

/// Default quota limits
pub const DEFAULT_DAILY_LIMIT: u32 = 15; // downloads per calendar day, every tier
pub const DEFAULT_FREE_MONTHLY_LIMIT: u32 = 350; // downloads per calendar month
pub const DEFAULT_PREMIUM_MONTHLY_LIMIT: u32 = 1500; // downloads per calendar month
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 30 * 60; // replay grace window

/// Quota configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Daily limit, identical for every tier
    pub daily_limit: u32,

    /// Monthly limit for free subjects and lapsed premium subjects
    pub free_monthly_limit: u32,

    /// Monthly limit while a premium tier is active
    pub premium_monthly_limit: u32,

    /// Repeat requests for the same resource inside this window are replayed
    pub dedup_window_secs: u64,

    /// Offset from UTC, in minutes, that defines the calendar day and month
    pub utc_offset_minutes: i32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            free_monthly_limit: DEFAULT_FREE_MONTHLY_LIMIT,
            premium_monthly_limit: DEFAULT_PREMIUM_MONTHLY_LIMIT,
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            utc_offset_minutes: 0,
        }
    }
}

impl QuotaConfig {
    /// Create a new quota configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective monthly limit
    pub fn monthly_limit(&self, premium_active: bool) -> u32 {
        if premium_active {
            self.premium_monthly_limit
        } else {
            self.free_monthly_limit
        }
    }

    /// Replay grace window
    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs as i64)
    }

    /// Fixed offset used for calendar boundaries
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid UTC offset: {} minutes. Must be within ±1439",
                self.utc_offset_minutes
            )
        })
    }

    /// Reset policy for the configured calendar
    pub fn reset_policy(&self) -> Result<ResetPolicy> {
        Ok(ResetPolicy::with_offset(self.utc_offset()?))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.daily_limit == 0 {
            anyhow::bail!("Daily limit must be > 0");
        }
        if self.free_monthly_limit == 0 {
            anyhow::bail!("Free monthly limit must be > 0");
        }
        if self.premium_monthly_limit < self.free_monthly_limit {
            anyhow::bail!(
                "Premium monthly limit ({}) must be >= free monthly limit ({})",
                self.premium_monthly_limit,
                self.free_monthly_limit
            );
        }
        if self.dedup_window_secs > 24 * 3600 {
            anyhow::bail!("Dedup window must be at most 24 hours");
        }
        self.utc_offset()?;
        Ok(())
    }
}
