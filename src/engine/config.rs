//! Engine tuning

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transaction timing and conflict retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on one consumption transaction, lock wait included
    pub commit_timeout_ms: u64,

    /// Extra attempts after a commit conflict
    pub conflict_retries: u32,

    /// First backoff delay, doubled on every retry
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling before jitter
    pub retry_max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: 2000,
            conflict_retries: 3,
            retry_base_delay_ms: 25,
            retry_max_delay_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.commit_timeout_ms == 0 {
            bail!("engine.commit_timeout_ms must be greater than 0");
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            bail!(
                "engine.retry_max_delay_ms ({}) must be at least retry_base_delay_ms ({})",
                self.retry_max_delay_ms,
                self.retry_base_delay_ms
            );
        }
        Ok(())
    }
}
