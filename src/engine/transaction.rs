//! Consumption Transaction
//!
//! The single mutation point for usage counters. Callers hold the subject's
//! writer lock; the transaction re-reads the account, re-evaluates it, checks
//! for a replay and stages one commit. The store applies that commit as one
//! unit or rejects it, so an early return or a dropped future leaves nothing
//! behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{AccessPayload, Resource};
use crate::error::{QuotaError, Result};
use crate::ids::{ResourceId, SubjectId};
use crate::ledger::{ClientMeta, ConsumptionRecord, DedupGuard, SourceChannel};
use crate::quota::{Gate, QuotaCheckResult, QuotaEvaluator};
use crate::store::{ConsumptionCommit, QuotaStore};

/// A consumption request as it arrives from a surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRequest {
    pub subject_id: SubjectId,
    pub resource_id: ResourceId,
    #[serde(default)]
    pub channel: SourceChannel,
    #[serde(default)]
    pub client: ClientMeta,
}

impl ConsumptionRequest {
    pub fn new(subject_id: SubjectId, resource_id: ResourceId) -> Self {
        Self {
            subject_id,
            resource_id,
            channel: SourceChannel::default(),
            client: ClientMeta::default(),
        }
    }

    pub fn via(mut self, channel: SourceChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_client(mut self, client: ClientMeta) -> Self {
        self.client = client;
        self
    }
}

/// Why a consumption was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Denial {
    pub gate: Gate,
    pub reason: String,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: u64,
}

impl Denial {
    fn from_check(gate: Gate, check: &QuotaCheckResult) -> Self {
        let window = check.window(gate);
        Self {
            gate,
            reason: check.reason.clone(),
            reset_at: window.resets_at,
            retry_after_secs: window.resets_in_secs,
        }
    }
}

/// Result of one consumption attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConsumptionOutcome {
    /// Quota charged and access granted
    Accepted {
        payload: AccessPayload,
        record: ConsumptionRecord,
        /// Status after the commit
        status: QuotaCheckResult,
    },
    /// Same resource consumed inside the replay window; nothing charged
    Replayed {
        payload: AccessPayload,
        original: ConsumptionRecord,
    },
    /// A window is exhausted; nothing charged
    Denied {
        denial: Denial,
        status: QuotaCheckResult,
    },
}

impl ConsumptionOutcome {
    /// Short name used in logs and metric labels
    pub fn label(&self) -> &'static str {
        match self {
            ConsumptionOutcome::Accepted { .. } => "accepted",
            ConsumptionOutcome::Replayed { .. } => "replayed",
            ConsumptionOutcome::Denied { .. } => "denied",
        }
    }

    /// Access payload for granted outcomes
    pub fn payload(&self) -> Option<&AccessPayload> {
        match self {
            ConsumptionOutcome::Accepted { payload, .. }
            | ConsumptionOutcome::Replayed { payload, .. } => Some(payload),
            ConsumptionOutcome::Denied { .. } => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ConsumptionOutcome::Accepted { .. })
    }

    /// Turn a denial into [`QuotaError::QuotaExceeded`]
    pub fn into_result(self) -> Result<AccessPayload> {
        match self {
            ConsumptionOutcome::Accepted { payload, .. }
            | ConsumptionOutcome::Replayed { payload, .. } => Ok(payload),
            ConsumptionOutcome::Denied { denial, .. } => Err(QuotaError::QuotaExceeded {
                gate: denial.gate,
                reason: denial.reason,
                reset_at: denial.reset_at,
                retry_after_secs: denial.retry_after_secs,
            }),
        }
    }
}

/// One pass of the consume algorithm against a store
pub struct ConsumptionTransaction<'a> {
    store: &'a dyn QuotaStore,
    evaluator: &'a QuotaEvaluator,
    dedup: DedupGuard,
}

impl<'a> ConsumptionTransaction<'a> {
    pub fn new(store: &'a dyn QuotaStore, evaluator: &'a QuotaEvaluator, dedup: DedupGuard) -> Self {
        Self {
            store,
            evaluator,
            dedup,
        }
    }

    /// Evaluate, dedup and commit a consumption of `resource` at `now`
    ///
    /// The caller must hold the writer lock for `subject_id`.
    pub async fn execute(
        &self,
        subject_id: &SubjectId,
        resource: &Resource,
        channel: SourceChannel,
        client: ClientMeta,
        now: DateTime<Utc>,
    ) -> Result<ConsumptionOutcome> {
        let account = self
            .store
            .account(subject_id)
            .await?
            .ok_or_else(|| QuotaError::subject_not_found(subject_id))?;
        let expected_version = account.version;

        let mut staged = account;
        let check = self.evaluator.can_consume(&mut staged, now);
        if let Some(gate) = check.blocking_gate {
            return Ok(ConsumptionOutcome::Denied {
                denial: Denial::from_check(gate, &check),
                status: check,
            });
        }

        if let Some(original) = self
            .dedup
            .recent_duplicate(self.store, subject_id, &resource.id, now)
            .await?
        {
            debug!(
                "Replay of {} by {} within {} minutes of {}",
                resource.id,
                subject_id,
                self.dedup.window().num_minutes(),
                original.timestamp
            );
            return Ok(ConsumptionOutcome::Replayed {
                payload: resource.access_payload(),
                original,
            });
        }

        staged.record_consumption();
        let record = ConsumptionRecord::new(subject_id.clone(), resource, channel, client, now);
        self.store
            .commit(ConsumptionCommit {
                expected_version,
                account: staged.clone(),
                record: record.clone(),
            })
            .await?;

        let status = self.evaluator.can_consume(&mut staged, now);
        Ok(ConsumptionOutcome::Accepted {
            payload: resource.access_payload(),
            record,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SubjectIdentity;
    use crate::quota::{QuotaAccount, QuotaConfig, ResetPolicy};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        store: MemoryStore,
        evaluator: QuotaEvaluator,
        subject: SubjectId,
        resource: Resource,
        now: DateTime<Utc>,
    }

    impl Fixture {
        async fn new(account: impl FnOnce(QuotaAccount) -> QuotaAccount) -> Self {
            let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
            let subject = SubjectId::parse("user-1").unwrap();
            let resource = Resource::new(ResourceId::parse("book-1").unwrap(), "Book", "ebook", "cdn://book-1");
            let store = MemoryStore::new();
            let base = QuotaAccount::new(subject.clone(), now - Duration::days(10), &ResetPolicy::utc());
            let mut seeded = account(base);
            seeded.version = 0;
            store
                .register_subject(SubjectIdentity::verified(subject.clone()), seeded)
                .await
                .unwrap();
            store.register_resource(resource.clone()).await.unwrap();
            Self {
                store,
                evaluator: QuotaEvaluator::new(QuotaConfig::default(), ResetPolicy::utc()),
                subject,
                resource,
                now,
            }
        }

        fn transaction(&self) -> ConsumptionTransaction<'_> {
            ConsumptionTransaction::new(&self.store, &self.evaluator, DedupGuard::new(Duration::minutes(30)))
        }

        async fn consume(&self, resource: &Resource, at: DateTime<Utc>) -> ConsumptionOutcome {
            self.transaction()
                .execute(&self.subject, resource, SourceChannel::Web, ClientMeta::default(), at)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_accepted_charges_every_counter() {
        let fx = Fixture::new(|a| a).await;
        let outcome = fx.consume(&fx.resource, fx.now).await;

        let ConsumptionOutcome::Accepted { status, record, payload } = outcome else {
            panic!("expected accepted");
        };
        assert_eq!(payload.location, "cdn://book-1");
        assert_eq!(record.category, "ebook");
        assert_eq!(status.daily.used, 1);
        assert_eq!(status.daily.remaining, 14);

        let account = fx.store.account(&fx.subject).await.unwrap().unwrap();
        assert_eq!(account.lifetime_count, 1);
        assert_eq!(account.monthly_count, 1);
    }

    #[tokio::test]
    async fn test_replay_inside_window() {
        let fx = Fixture::new(|a| a).await;
        fx.consume(&fx.resource, fx.now).await;
        let second = fx.consume(&fx.resource, fx.now + Duration::minutes(5)).await;

        assert_eq!(second.label(), "replayed");
        assert_eq!(second.payload().unwrap().resource_id, fx.resource.id);
        let account = fx.store.account(&fx.subject).await.unwrap().unwrap();
        assert_eq!(account.daily_count, 1);
    }

    #[tokio::test]
    async fn test_denied_at_daily_limit() {
        let fx = Fixture::new(|mut a| {
            a.daily_anchor = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap().date_naive();
            a.daily_count = 15;
            a.monthly_count = 15;
            a
        })
        .await;
        let outcome = fx.consume(&fx.resource, fx.now).await;

        let ConsumptionOutcome::Denied { denial, status } = outcome.clone() else {
            panic!("expected denied");
        };
        assert_eq!(denial.gate, Gate::Daily);
        assert_eq!(status.daily.remaining, 0);
        assert_eq!(denial.reset_at, Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap());
        assert!(matches!(
            outcome.into_result(),
            Err(QuotaError::QuotaExceeded { gate: Gate::Daily, .. })
        ));
        assert!(fx.store.records_for(&fx.subject).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_account() {
        let fx = Fixture::new(|a| a).await;
        let stranger = SubjectId::parse("stranger").unwrap();
        let err = fx
            .transaction()
            .execute(&stranger, &fx.resource, SourceChannel::Api, ClientMeta::default(), fx.now)
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::NotFound { .. }));
    }
}
