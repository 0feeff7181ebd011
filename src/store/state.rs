//! Backing state shared by the in-memory and file stores
//!
//! [`Tables`] holds subjects, accounts and resources and is small enough to
//! snapshot whole. The ledger lives beside it in [`StoreState`] and only ever
//! grows by appending. Every mutating method validates before it writes, so a
//! failed call leaves the state untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ConsumptionCommit;
use crate::catalog::Resource;
use crate::error::{EntityKind, QuotaError, Result};
use crate::identity::SubjectIdentity;
use crate::ids::{ResourceId, SubjectId};
use crate::ledger::{ConsumptionRecord, HistoryPage, PageRequest};
use crate::quota::{QuotaAccount, ResetPolicy, Tier};

/// Subjects, accounts and resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Tables {
    subjects: BTreeMap<SubjectId, SubjectIdentity>,
    accounts: BTreeMap<SubjectId, QuotaAccount>,
    resources: BTreeMap<ResourceId, Resource>,
    /// Ledger records covered by these tables
    ledger_len: u64,
}

impl Tables {
    pub(crate) fn register_subject(
        &mut self,
        identity: SubjectIdentity,
        account: QuotaAccount,
    ) -> Result<()> {
        if identity.subject_id != account.subject_id {
            return Err(QuotaError::invalid(
                "subject_id",
                "identity and account belong to different subjects",
            ));
        }
        if self.subjects.contains_key(&identity.subject_id) {
            return Err(QuotaError::AlreadyExists {
                kind: EntityKind::Subject,
                id: identity.subject_id.to_string(),
            });
        }
        self.accounts.insert(account.subject_id.clone(), account);
        self.subjects.insert(identity.subject_id.clone(), identity);
        Ok(())
    }

    pub(crate) fn register_resource(&mut self, resource: Resource) -> Result<()> {
        if self.resources.contains_key(&resource.id) {
            return Err(QuotaError::AlreadyExists {
                kind: EntityKind::Resource,
                id: resource.id.to_string(),
            });
        }
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    pub(crate) fn ledger_len(&self) -> u64 {
        self.ledger_len
    }

    pub(crate) fn identity(&self, subject_id: &SubjectId) -> Option<SubjectIdentity> {
        self.subjects.get(subject_id).cloned()
    }

    pub(crate) fn resource(&self, resource_id: &ResourceId) -> Option<Resource> {
        self.resources.get(resource_id).cloned()
    }

    pub(crate) fn account(&self, subject_id: &SubjectId) -> Option<QuotaAccount> {
        self.accounts.get(subject_id).cloned()
    }

    pub(crate) fn accounts(&self) -> Vec<QuotaAccount> {
        self.accounts.values().cloned().collect()
    }

    /// Whether `refresh_windows` would change anything
    pub(crate) fn windows_stale(
        &self,
        subject_id: &SubjectId,
        policy: &ResetPolicy,
        now: DateTime<Utc>,
    ) -> bool {
        self.accounts.get(subject_id).is_some_and(|account| {
            let mut scratch = account.clone();
            policy.apply(&mut scratch, now).any()
        })
    }

    pub(crate) fn refresh_windows(
        &mut self,
        subject_id: &SubjectId,
        policy: &ResetPolicy,
        now: DateTime<Utc>,
    ) -> Option<QuotaAccount> {
        let account = self.accounts.get_mut(subject_id)?;
        policy.apply(account, now);
        Some(account.clone())
    }

    pub(crate) fn set_tier(
        &mut self,
        subject_id: &SubjectId,
        tier: Tier,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<QuotaAccount> {
        let account = self
            .accounts
            .get_mut(subject_id)
            .ok_or_else(|| QuotaError::subject_not_found(subject_id))?;
        account.tier = tier;
        account.tier_expiry = expiry;
        Ok(account.clone())
    }

    /// Subjects whose premium tier has lapsed at `now`
    pub(crate) fn lapsed_premium(&self, now: DateTime<Utc>) -> Vec<SubjectId> {
        self.accounts
            .values()
            .filter(|a| a.tier == Tier::Premium && !a.premium_active(now))
            .map(|a| a.subject_id.clone())
            .collect()
    }

    pub(crate) fn expire_tiers(&mut self, now: DateTime<Utc>) -> Vec<SubjectId> {
        let lapsed = self.lapsed_premium(now);
        for subject_id in &lapsed {
            if let Some(account) = self.accounts.get_mut(subject_id) {
                account.tier = Tier::Free;
                account.tier_expiry = None;
            }
        }
        lapsed
    }

    pub(crate) fn resource_counters(&self) -> Vec<(ResourceId, u64)> {
        self.resources
            .values()
            .map(|r| (r.id.clone(), r.download_count))
            .collect()
    }

    /// Bump all four counters for `commit` and count its record
    ///
    /// The record itself is not stored here.
    pub(crate) fn apply_commit(&mut self, commit: &ConsumptionCommit) -> Result<()> {
        let subject_id = &commit.record.subject_id;
        let resource_id = &commit.record.resource_id;

        let stored = self
            .accounts
            .get(subject_id)
            .ok_or_else(|| QuotaError::subject_not_found(subject_id))?;
        if stored.version != commit.expected_version {
            return Err(QuotaError::Conflict(format!(
                "account {} changed during consumption (expected version {}, found {})",
                subject_id, commit.expected_version, stored.version
            )));
        }
        if !self.resources.contains_key(resource_id) {
            return Err(QuotaError::resource_not_found(resource_id));
        }

        // validated; the writes below cannot fail
        if let Some(account) = self.accounts.get_mut(subject_id) {
            account.apply_counters_from(&commit.account);
            account.version = commit.expected_version + 1;
        }
        if let Some(resource) = self.resources.get_mut(resource_id) {
            resource.download_count = resource.download_count.saturating_add(1);
        }
        self.ledger_len += 1;
        Ok(())
    }
}

/// Tables plus the ledger partitioned by subject
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) tables: Tables,
    /// Each partition in append order
    records: BTreeMap<SubjectId, Vec<ConsumptionRecord>>,
}

impl StoreState {
    /// Rebuild from a snapshot and the ledger records it covers
    pub(crate) fn from_parts(tables: Tables, ledger: Vec<ConsumptionRecord>) -> Self {
        let mut state = Self {
            tables,
            records: BTreeMap::new(),
        };
        for record in ledger {
            state.push_record(record);
        }
        state
    }

    pub(crate) fn push_record(&mut self, record: ConsumptionRecord) {
        self.records
            .entry(record.subject_id.clone())
            .or_default()
            .push(record);
    }

    pub(crate) fn latest_record(
        &self,
        subject_id: &SubjectId,
        resource_id: &ResourceId,
    ) -> Option<ConsumptionRecord> {
        self.records
            .get(subject_id)?
            .iter()
            .rev()
            .find(|r| &r.resource_id == resource_id)
            .cloned()
    }

    pub(crate) fn history(&self, subject_id: &SubjectId, page: PageRequest) -> HistoryPage {
        let records = self.records.get(subject_id).map(Vec::as_slice).unwrap_or(&[]);
        HistoryPage::from_newest_first(records.iter().rev(), records.len(), page)
    }

    pub(crate) fn records_for(&self, subject_id: &SubjectId) -> Vec<ConsumptionRecord> {
        self.records.get(subject_id).cloned().unwrap_or_default()
    }

    pub(crate) fn all_records(&self) -> Vec<ConsumptionRecord> {
        self.records.values().flatten().cloned().collect()
    }

    /// Append the record and bump all four counters
    pub(crate) fn commit(&mut self, commit: ConsumptionCommit) -> Result<()> {
        self.tables.apply_commit(&commit)?;
        self.push_record(commit.record);
        Ok(())
    }
}
