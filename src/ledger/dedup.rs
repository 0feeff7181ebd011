//! Replay detection
//!
//! Protects legitimate retries (double submission, page reload) from burning
//! quota twice. Pure lookup, no side effects.

use chrono::{DateTime, Duration, Utc};

use super::record::ConsumptionRecord;
use crate::error::Result;
use crate::ids::{ResourceId, SubjectId};
use crate::store::QuotaStore;

/// Finds a recent consumption of the same resource by the same subject
#[derive(Debug, Clone, Copy)]
pub struct DedupGuard {
    window: Duration,
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether `record` falls strictly inside the window ending at `now`
    pub fn covers(&self, record: &ConsumptionRecord, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(record.timestamp) < self.window
    }

    /// The consumption being repeated, if any
    pub async fn recent_duplicate(
        &self,
        store: &dyn QuotaStore,
        subject_id: &SubjectId,
        resource_id: &ResourceId,
        now: DateTime<Utc>,
    ) -> Result<Option<ConsumptionRecord>> {
        if self.window <= Duration::zero() {
            return Ok(None);
        }
        let latest = store.latest_record(subject_id, resource_id).await?;
        Ok(latest.filter(|record| self.covers(record, now)))
    }

    pub async fn is_recent_duplicate(
        &self,
        store: &dyn QuotaStore,
        subject_id: &SubjectId,
        resource_id: &ResourceId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .recent_duplicate(store, subject_id, resource_id, now)
            .await?
            .is_some())
    }
}
