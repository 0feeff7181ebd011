//! Quota Service
//!
//! Entry point for every exposed operation. Owns the subject locks and runs
//! each consumption as a bounded transaction with conflict retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::locks::SubjectLocks;
use super::retry::{calculate_retry_delay, RetryDecision};
use super::stats::{GlobalStats, StatsAggregator, SubjectStats};
use super::transaction::{ConsumptionOutcome, ConsumptionRequest, ConsumptionTransaction};
use crate::catalog::{Resource, ResourceCatalog};
use crate::clock::{Clock, SystemClock};
use crate::error::{QuotaError, Result};
use crate::identity::IdentityProvider;
use crate::ids::SubjectId;
use crate::ledger::{DedupGuard, HistoryPage, PageRequest};
use crate::metrics;
use crate::quota::{QuotaAccount, QuotaCheckResult, QuotaConfig, QuotaEvaluator, Tier};
use crate::store::QuotaStore;

/// Outcome of a tier-expiry sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub swept_at: DateTime<Utc>,
    /// Subjects downgraded to the free tier
    pub expired: Vec<SubjectId>,
}

/// Quota enforcement and usage accounting
pub struct QuotaService {
    store: Arc<dyn QuotaStore>,
    catalog: Arc<dyn ResourceCatalog>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    evaluator: QuotaEvaluator,
    dedup: DedupGuard,
    stats: StatsAggregator,
    locks: SubjectLocks,
    engine: EngineConfig,
}

impl QuotaService {
    /// Service over a backend that is store, catalog and identity provider at once
    pub fn new<B>(backend: Arc<B>, quota: &QuotaConfig, engine: EngineConfig) -> anyhow::Result<Self>
    where
        B: QuotaStore + ResourceCatalog + IdentityProvider + 'static,
    {
        Self::with_backend(
            backend.clone(),
            backend.clone(),
            backend,
            quota,
            engine,
        )
    }

    /// Service over separately supplied collaborators
    pub fn with_backend(
        store: Arc<dyn QuotaStore>,
        catalog: Arc<dyn ResourceCatalog>,
        identity: Arc<dyn IdentityProvider>,
        quota: &QuotaConfig,
        engine: EngineConfig,
    ) -> anyhow::Result<Self> {
        quota.validate()?;
        engine.validate()?;
        let evaluator = QuotaEvaluator::from_config(quota)?;
        Ok(Self {
            store,
            catalog,
            identity,
            clock: Arc::new(SystemClock),
            dedup: DedupGuard::new(quota.dedup_window()),
            stats: StatsAggregator::new(evaluator.policy().clone()),
            evaluator,
            locks: SubjectLocks::new(),
            engine,
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn evaluator(&self) -> &QuotaEvaluator {
        &self.evaluator
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn require_subject(&self, subject_id: &SubjectId) -> Result<()> {
        match self.identity.identity(subject_id).await? {
            Some(_) => Ok(()),
            None => Err(QuotaError::subject_not_found(subject_id)),
        }
    }

    async fn require_verified(&self, subject_id: &SubjectId) -> Result<()> {
        match self.identity.identity(subject_id).await? {
            Some(identity) if identity.verified => Ok(()),
            Some(_) => Err(QuotaError::Forbidden(subject_id.to_string())),
            None => Err(QuotaError::subject_not_found(subject_id)),
        }
    }

    async fn active_resource(&self, request: &ConsumptionRequest) -> Result<Resource> {
        self.catalog
            .resource(&request.resource_id)
            .await?
            .filter(|resource| resource.active)
            .ok_or_else(|| QuotaError::resource_not_found(&request.resource_id))
    }

    /// Current eligibility, rolling stale windows over first
    pub async fn status(&self, subject_id: &SubjectId) -> Result<QuotaCheckResult> {
        self.require_verified(subject_id).await?;
        let now = self.clock.now();
        let mut account = self
            .store
            .refresh_windows(subject_id, self.evaluator.policy(), now)
            .await?
            .ok_or_else(|| QuotaError::subject_not_found(subject_id))?;
        Ok(self.evaluator.can_consume(&mut account, now))
    }

    /// One page of consumption history, newest first
    pub async fn history(&self, subject_id: &SubjectId, page: u32, page_size: u32) -> Result<HistoryPage> {
        let request = PageRequest::new(page, page_size)?;
        self.require_subject(subject_id).await?;
        self.store.history(subject_id, request).await
    }

    /// Consume one unit of quota for `request.resource_id`
    ///
    /// Denials and replays are ordinary outcomes. Errors are reserved for
    /// unknown entities, unverified subjects, exhausted conflict retries and
    /// storage failures.
    pub async fn consume(&self, request: ConsumptionRequest) -> Result<ConsumptionOutcome> {
        let started = Instant::now();
        let result = self.consume_with_retries(&request).await;
        metrics::CONSUMPTION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) if e.is_retryable() => "conflict",
            Err(_) => "error",
        };
        let channel = request.channel.to_string();
        metrics::CONSUMPTIONS_TOTAL
            .with_label_values(&[label, channel.as_str()])
            .inc();

        match &result {
            Ok(ConsumptionOutcome::Accepted { status, .. }) => info!(
                "✅ {} consumed {} via {} ({} of {} daily left)",
                request.subject_id,
                request.resource_id,
                request.channel,
                status.daily.remaining,
                status.daily.limit
            ),
            Ok(ConsumptionOutcome::Replayed { original, .. }) => debug!(
                "{} replayed {} (first consumed at {})",
                request.subject_id, request.resource_id, original.timestamp
            ),
            Ok(ConsumptionOutcome::Denied { denial, .. }) => warn!(
                "⛔ {} denied {}: {}",
                request.subject_id, request.resource_id, denial.reason
            ),
            Err(e) => warn!(
                "Consumption of {} by {} failed: {}",
                request.resource_id, request.subject_id, e
            ),
        }
        result
    }

    async fn consume_with_retries(&self, request: &ConsumptionRequest) -> Result<ConsumptionOutcome> {
        self.require_verified(&request.subject_id).await?;
        let resource = self.active_resource(request).await?;

        let mut attempt = 0;
        loop {
            match self.attempt(request, &resource).await {
                Err(e) if e.is_retryable() => {
                    metrics::COMMIT_CONFLICTS_TOTAL.inc();
                    match calculate_retry_delay(attempt, &self.engine) {
                        RetryDecision::Retry(delay) => {
                            warn!(
                                "Conflict consuming {} for {} (attempt {}): {}",
                                request.resource_id,
                                request.subject_id,
                                attempt + 1,
                                e
                            );
                            metrics::COMMIT_RETRIES_TOTAL.inc();
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        RetryDecision::GiveUp => return Err(e),
                    }
                }
                result => return result,
            }
        }
    }

    async fn attempt(&self, request: &ConsumptionRequest, resource: &Resource) -> Result<ConsumptionOutcome> {
        let timeout = self.engine.commit_timeout();
        let transaction = async {
            let _guard = self.locks.acquire(&request.subject_id).await;
            let now = self.clock.now();
            ConsumptionTransaction::new(self.store.as_ref(), &self.evaluator, self.dedup)
                .execute(
                    &request.subject_id,
                    resource,
                    request.channel,
                    request.client.clone(),
                    now,
                )
                .await
        };

        match tokio::time::timeout(timeout, transaction).await {
            Ok(result) => result,
            Err(_) => Err(QuotaError::Conflict(format!(
                "consumption by {} did not complete within {} ms",
                request.subject_id, self.engine.commit_timeout_ms
            ))),
        }
    }

    /// Usage report for one subject
    pub async fn subject_stats(&self, subject_id: &SubjectId) -> Result<SubjectStats> {
        self.require_subject(subject_id).await?;
        let account = self
            .store
            .account(subject_id)
            .await?
            .ok_or_else(|| QuotaError::subject_not_found(subject_id))?;
        let records = self.store.records_for(subject_id).await?;
        Ok(self.stats.subject(&account, &records, self.clock.now()))
    }

    /// Usage report across all subjects
    pub async fn global_stats(&self) -> Result<GlobalStats> {
        let accounts = self.store.accounts().await?;
        let records = self.store.all_records().await?;
        let counters = self.store.resource_counters().await?;
        Ok(self
            .stats
            .global(&accounts, &records, &counters, self.clock.now()))
    }

    /// Downgrade every lapsed premium tier; counters are left alone
    pub async fn sweep_expired_tiers(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let expired = self.store.expire_tiers(now).await?;
        metrics::TIERS_EXPIRED_TOTAL.inc_by(expired.len() as u64);
        if expired.is_empty() {
            debug!("Tier sweep found no lapsed premium subjects");
        } else {
            info!("🧹 Tier sweep downgraded {} subject(s)", expired.len());
        }
        Ok(SweepReport {
            swept_at: now,
            expired,
        })
    }

    /// Grant premium until `expiry`
    pub async fn grant_premium(&self, subject_id: &SubjectId, expiry: DateTime<Utc>) -> Result<QuotaAccount> {
        let now = self.clock.now();
        if expiry <= now {
            return Err(QuotaError::invalid(
                "expiry",
                format!("must be in the future (now {})", now.to_rfc3339()),
            ));
        }
        self.require_subject(subject_id).await?;
        let account = self
            .store
            .set_tier(subject_id, Tier::Premium, Some(expiry))
            .await?;
        info!("⭐ {} is premium until {}", subject_id, expiry.to_rfc3339());
        Ok(account)
    }

    /// Forget subject locks no task is using
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }
}
