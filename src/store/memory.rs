//! In-memory quota store
//!
//! Backs tests and single-process deployments that do not need durability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::state::StoreState;
use super::{ConsumptionCommit, QuotaStore};
use crate::catalog::{Resource, ResourceCatalog};
use crate::error::Result;
use crate::identity::{IdentityProvider, SubjectIdentity};
use crate::ids::{ResourceId, SubjectId};
use crate::ledger::{ConsumptionRecord, HistoryPage, PageRequest};
use crate::quota::{QuotaAccount, ResetPolicy, Tier};

/// Volatile store holding subjects, resources, accounts and the ledger
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subject together with its quota account
    pub async fn register_subject(
        &self,
        identity: SubjectIdentity,
        account: QuotaAccount,
    ) -> Result<()> {
        self
            .state
            .write()
            .await
            .tables
            .register_subject(identity, account)
    }

    /// Add a resource to the catalog
    pub async fn register_resource(&self, resource: Resource) -> Result<()> {
        self.state.write().await.tables.register_resource(resource)
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn account(&self, subject_id: &SubjectId) -> Result<Option<QuotaAccount>> {
        Ok(self.state.read().await.tables.account(subject_id))
    }

    async fn accounts(&self) -> Result<Vec<QuotaAccount>> {
        Ok(self.state.read().await.tables.accounts())
    }

    async fn refresh_windows(
        &self,
        subject_id: &SubjectId,
        policy: &ResetPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<QuotaAccount>> {
        {
            let state = self.state.read().await;
            if !state.tables.windows_stale(subject_id, policy, now) {
                return Ok(state.tables.account(subject_id));
            }
        }
        // re-checked under the write guard; a concurrent refresh may have won
        Ok(self
            .state
            .write()
            .await
            .tables
            .refresh_windows(subject_id, policy, now))
    }

    async fn set_tier(
        &self,
        subject_id: &SubjectId,
        tier: Tier,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<QuotaAccount> {
        self.state.write().await.tables.set_tier(subject_id, tier, expiry)
    }

    async fn expire_tiers(&self, now: DateTime<Utc>) -> Result<Vec<SubjectId>> {
        if self.state.read().await.tables.lapsed_premium(now).is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.state.write().await.tables.expire_tiers(now))
    }

    async fn latest_record(
        &self,
        subject_id: &SubjectId,
        resource_id: &ResourceId,
    ) -> Result<Option<ConsumptionRecord>> {
        Ok(self.state.read().await.latest_record(subject_id, resource_id))
    }

    async fn history(&self, subject_id: &SubjectId, page: PageRequest) -> Result<HistoryPage> {
        Ok(self.state.read().await.history(subject_id, page))
    }

    async fn records_for(&self, subject_id: &SubjectId) -> Result<Vec<ConsumptionRecord>> {
        Ok(self.state.read().await.records_for(subject_id))
    }

    async fn all_records(&self) -> Result<Vec<ConsumptionRecord>> {
        Ok(self.state.read().await.all_records())
    }

    async fn resource_counters(&self) -> Result<Vec<(ResourceId, u64)>> {
        Ok(self.state.read().await.tables.resource_counters())
    }

    async fn commit(&self, commit: ConsumptionCommit) -> Result<()> {
        self.state.write().await.commit(commit)
    }
}

#[async_trait]
impl ResourceCatalog for MemoryStore {
    async fn resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        Ok(self.state.read().await.tables.resource(id))
    }
}

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn identity(&self, subject_id: &SubjectId) -> Result<Option<SubjectIdentity>> {
        Ok(self.state.read().await.tables.identity(subject_id))
    }
}
