//! Background tier-expiry sweeper

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use super::service::QuotaService;

/// Sweeper schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Run the sweeper alongside the HTTP server
    pub enabled: bool,

    /// Seconds between sweeps
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.interval_secs == 0 {
            bail!("sweep.interval_secs must be greater than 0 when the sweeper is enabled");
        }
        Ok(())
    }
}

/// Periodically downgrade lapsed premium tiers and prune idle subject locks
///
/// The first sweep runs one full interval after spawning.
pub fn spawn_tier_sweeper(service: Arc<QuotaService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;

            if let Err(e) = service.sweep_expired_tiers().await {
                error!("Tier sweep failed: {}", e);
            }

            let pruned = service.prune_locks();
            if pruned > 0 {
                debug!("Pruned {} idle subject lock(s)", pruned);
            }
        }
    })
}
