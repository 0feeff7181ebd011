//! Usage statistics
//!
//! Read-only reporting derived from the ledger and the quota accounts.
//! Subjects without history get zeros, never errors.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ids::{ResourceId, SubjectId};
use crate::ledger::ConsumptionRecord;
use crate::quota::{QuotaAccount, ResetPolicy, Tier};

/// Resources listed in the global top list
pub const TOP_RESOURCES: usize = 10;

/// Busiest calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakDay {
    pub date: NaiveDate,
    pub count: u64,
}

/// Busiest hour of day, local to the reset calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakHour {
    pub hour: u32,
    pub count: u64,
}

/// Usage report for one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectStats {
    pub subject_id: SubjectId,
    pub generated_at: DateTime<Utc>,
    pub lifetime_count: u64,
    pub today: u64,
    /// Since Monday of the current week
    pub this_week: u64,
    pub this_month: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_channel: BTreeMap<String, u64>,
    pub most_active_day: Option<PeakDay>,
    pub most_active_hour: Option<PeakHour>,
    /// Lifetime consumptions per day since the account was created
    pub daily_average: f64,
    pub first_consumption: Option<DateTime<Utc>>,
    pub last_consumption: Option<DateTime<Utc>>,
}

/// Download counter of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub resource_id: ResourceId,
    pub downloads: u64,
}

/// Usage report across every subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub generated_at: DateTime<Utc>,
    pub total_subjects: usize,
    pub active_premium_subjects: usize,
    pub total_consumptions: u64,
    pub today: u64,
    pub this_month: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_channel: BTreeMap<String, u64>,
    pub top_resources: Vec<ResourceUsage>,
}

/// Builds [`SubjectStats`] and [`GlobalStats`]
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    policy: ResetPolicy,
    top_resources: usize,
}

impl StatsAggregator {
    pub fn new(policy: ResetPolicy) -> Self {
        Self {
            policy,
            top_resources: TOP_RESOURCES,
        }
    }

    pub fn with_top_resources(mut self, n: usize) -> Self {
        self.top_resources = n;
        self
    }

    pub fn subject(
        &self,
        account: &QuotaAccount,
        records: &[ConsumptionRecord],
        now: DateTime<Utc>,
    ) -> SubjectStats {
        let today = self.policy.local_date(now);
        let week_start = today - chrono::Duration::days(today.weekday().num_days_from_monday() as i64);

        let mut this_week = 0;
        let mut per_day: HashMap<NaiveDate, u64> = HashMap::new();
        let mut per_hour: HashMap<u32, u64> = HashMap::new();
        for record in records {
            let local = record.timestamp.with_timezone(&self.policy.offset());
            let date = local.date_naive();
            if date >= week_start && date <= today {
                this_week += 1;
            }
            *per_day.entry(date).or_default() += 1;
            *per_hour.entry(local.hour()).or_default() += 1;
        }

        // ties resolve to the earliest day / hour
        let most_active_day = per_day
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(date, count)| PeakDay { date, count });
        let most_active_hour = per_hour
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(hour, count)| PeakHour { hour, count });

        let days_active = (now - account.created_at).num_days().max(1);

        SubjectStats {
            subject_id: account.subject_id.clone(),
            generated_at: now,
            lifetime_count: account.lifetime_count,
            today: self.count_today(records, now),
            this_week,
            this_month: self.count_this_month(records, now),
            by_category: by_category(records),
            by_channel: by_channel(records),
            most_active_day,
            most_active_hour,
            daily_average: account.lifetime_count as f64 / days_active as f64,
            first_consumption: records.iter().map(|r| r.timestamp).min(),
            last_consumption: records.iter().map(|r| r.timestamp).max(),
        }
    }

    pub fn global(
        &self,
        accounts: &[QuotaAccount],
        records: &[ConsumptionRecord],
        counters: &[(ResourceId, u64)],
        now: DateTime<Utc>,
    ) -> GlobalStats {
        let mut top: Vec<ResourceUsage> = counters
            .iter()
            .filter(|(_, downloads)| *downloads > 0)
            .map(|(resource_id, downloads)| ResourceUsage {
                resource_id: resource_id.clone(),
                downloads: *downloads,
            })
            .collect();
        top.sort_by(|a, b| {
            b.downloads
                .cmp(&a.downloads)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });
        top.truncate(self.top_resources);

        GlobalStats {
            generated_at: now,
            total_subjects: accounts.len(),
            active_premium_subjects: accounts
                .iter()
                .filter(|a| a.tier == Tier::Premium && a.premium_active(now))
                .count(),
            total_consumptions: records.len() as u64,
            today: self.count_today(records, now),
            this_month: self.count_this_month(records, now),
            by_category: by_category(records),
            by_channel: by_channel(records),
            top_resources: top,
        }
    }

    fn count_today(&self, records: &[ConsumptionRecord], now: DateTime<Utc>) -> u64 {
        let today = self.policy.local_date(now);
        records
            .iter()
            .filter(|r| self.policy.local_date(r.timestamp) == today)
            .count() as u64
    }

    fn count_this_month(&self, records: &[ConsumptionRecord], now: DateTime<Utc>) -> u64 {
        let month = self.policy.local_month(now);
        records
            .iter()
            .filter(|r| self.policy.local_month(r.timestamp) == month)
            .count() as u64
    }
}

fn by_category(records: &[ConsumptionRecord]) -> BTreeMap<String, u64> {
    let mut map = BTreeMap::new();
    for record in records {
        *map.entry(record.category.clone()).or_default() += 1;
    }
    map
}

fn by_channel(records: &[ConsumptionRecord]) -> BTreeMap<String, u64> {
    let mut map = BTreeMap::new();
    for record in records {
        *map.entry(record.channel.to_string()).or_default() += 1;
    }
    map
}
