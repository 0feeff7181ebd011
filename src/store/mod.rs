//! Quota Store
//!
//! Persistence seam for quota accounts, resource counters and the
//! consumption ledger.
//!
//! A [`ConsumptionCommit`] is the only write that touches usage counters. It
//! is applied as one unit: the ledger append, the three account counters and
//! the resource counter all land together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::ids::{ResourceId, SubjectId};
use crate::ledger::{ConsumptionRecord, HistoryPage, PageRequest};
use crate::quota::{QuotaAccount, ResetPolicy, Tier};

pub mod file;
pub mod memory;
mod state;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Staged result of an accepted consumption
#[derive(Debug, Clone)]
pub struct ConsumptionCommit {
    /// Account version observed when the consumption was evaluated
    pub expected_version: u64,
    /// Account with rolled-over windows and incremented counters
    pub account: QuotaAccount,
    /// Ledger entry to append
    pub record: ConsumptionRecord,
}

/// Storage for accounts, counters and the ledger
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Fetch one account
    async fn account(&self, subject_id: &SubjectId) -> Result<Option<QuotaAccount>>;

    /// Every account, for sweeps and global reports
    async fn accounts(&self) -> Result<Vec<QuotaAccount>>;

    /// Roll stale windows over in place and return the refreshed account
    async fn refresh_windows(
        &self,
        subject_id: &SubjectId,
        policy: &ResetPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<QuotaAccount>>;

    /// Change tier fields only
    async fn set_tier(
        &self,
        subject_id: &SubjectId,
        tier: Tier,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<QuotaAccount>;

    /// Downgrade every premium account whose expiry is not after `now`
    async fn expire_tiers(&self, now: DateTime<Utc>) -> Result<Vec<SubjectId>>;

    /// Most recent consumption of `resource_id` by `subject_id`
    async fn latest_record(
        &self,
        subject_id: &SubjectId,
        resource_id: &ResourceId,
    ) -> Result<Option<ConsumptionRecord>>;

    /// A page of one subject's ledger, newest first
    async fn history(&self, subject_id: &SubjectId, page: PageRequest) -> Result<HistoryPage>;

    /// One subject's full ledger, oldest first
    async fn records_for(&self, subject_id: &SubjectId) -> Result<Vec<ConsumptionRecord>>;

    /// The whole ledger
    async fn all_records(&self) -> Result<Vec<ConsumptionRecord>>;

    /// Download counter of every resource
    async fn resource_counters(&self) -> Result<Vec<(ResourceId, u64)>>;

    /// Apply an accepted consumption atomically
    ///
    /// Fails with a conflict when the stored account version no longer
    /// matches `expected_version`.
    async fn commit(&self, commit: ConsumptionCommit) -> Result<()>;
}
