//! Quota Evaluator
//!
//! Read-only eligibility computation. The only state it touches is window
//! bookkeeping through [`ResetPolicy`]; usage counters are never incremented
//! here.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::account::{QuotaAccount, Tier};
use super::config::QuotaConfig;
use super::reset::ResetPolicy;
use crate::ids::SubjectId;

/// A quota window acting as a consumption gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    Daily,
    Monthly,
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gate::Daily => write!(f, "daily"),
            Gate::Monthly => write!(f, "monthly"),
        }
    }
}

/// Usage of one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    /// Next window boundary
    pub resets_at: DateTime<Utc>,
    /// Seconds until `resets_at`, rounded up
    pub resets_in_secs: u64,
}

impl WindowStatus {
    fn new(used: u32, limit: u32, resets_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let millis = (resets_at - now).num_milliseconds().max(0) as u64;
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            resets_at,
            resets_in_secs: millis.div_ceil(1000),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Human countdown to the next boundary
    pub fn countdown(&self) -> String {
        format_countdown(self.resets_in_secs)
    }
}

/// Tier state at evaluation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierStatus {
    pub tier: Tier,
    /// Premium and not yet expired
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Whole days left on an active premium tier, rounded up
    pub days_left: u32,
}

/// Eligibility snapshot, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaCheckResult {
    pub subject_id: SubjectId,
    pub eligible: bool,
    pub reason: String,
    /// First exhausted window, daily checked before monthly
    pub blocking_gate: Option<Gate>,
    pub daily: WindowStatus,
    pub monthly: WindowStatus,
    pub tier: TierStatus,
    pub checked_at: DateTime<Utc>,
}

impl QuotaCheckResult {
    pub fn window(&self, gate: Gate) -> &WindowStatus {
        match gate {
            Gate::Daily => &self.daily,
            Gate::Monthly => &self.monthly,
        }
    }
}

/// Computes eligibility against tiered limits
#[derive(Debug, Clone)]
pub struct QuotaEvaluator {
    config: QuotaConfig,
    policy: ResetPolicy,
}

impl QuotaEvaluator {
    pub fn new(config: QuotaConfig, policy: ResetPolicy) -> Self {
        Self { config, policy }
    }

    /// Build from configuration, deriving the reset calendar
    pub fn from_config(config: &QuotaConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.clone(), config.reset_policy()?))
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub fn policy(&self) -> &ResetPolicy {
        &self.policy
    }

    /// Evaluate whether `account` may consume one more unit at `now`
    ///
    /// Rolls stale windows over first, then checks the daily gate before the
    /// monthly gate. Both must have room for the subject to be eligible.
    pub fn can_consume(&self, account: &mut QuotaAccount, now: DateTime<Utc>) -> QuotaCheckResult {
        self.policy.apply(account, now);

        let premium_active = account.premium_active(now);
        let daily = WindowStatus::new(
            account.daily_count,
            self.config.daily_limit,
            self.policy.next_daily_reset(now),
            now,
        );
        let monthly = WindowStatus::new(
            account.monthly_count,
            self.config.monthly_limit(premium_active),
            self.policy.next_monthly_reset(now),
            now,
        );
        let tier = tier_status(account, premium_active, now);

        let blocking_gate = if daily.is_exhausted() {
            Some(Gate::Daily)
        } else if monthly.is_exhausted() {
            Some(Gate::Monthly)
        } else {
            None
        };

        let reason = match blocking_gate {
            Some(Gate::Daily) => format!(
                "Daily limit of {} downloads reached; resets in {} (at {})",
                daily.limit,
                daily.countdown(),
                daily.resets_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            Some(Gate::Monthly) => format!(
                "Monthly limit of {} downloads for the {} tier reached; resets in {} (at {})",
                monthly.limit,
                if premium_active { Tier::Premium } else { Tier::Free },
                monthly.countdown(),
                monthly.resets_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => format!(
                "{} of {} daily and {} of {} monthly downloads remaining",
                daily.remaining, daily.limit, monthly.remaining, monthly.limit
            ),
        };

        QuotaCheckResult {
            subject_id: account.subject_id.clone(),
            eligible: blocking_gate.is_none(),
            reason,
            blocking_gate,
            daily,
            monthly,
            tier,
            checked_at: now,
        }
    }
}

fn tier_status(account: &QuotaAccount, active: bool, now: DateTime<Utc>) -> TierStatus {
    let days_left = match account.tier_expiry {
        Some(expiry) if active => {
            let secs = (expiry - now).num_seconds().max(0) as u64;
            secs.div_ceil(86_400) as u32
        }
        _ => 0,
    };
    TierStatus {
        tier: account.tier,
        active,
        expires_at: account.tier_expiry,
        days_left,
    }
}

/// Render seconds as a compact countdown such as `2d 3h`, `5h 12m` or `40s`
pub fn format_countdown(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn evaluator() -> QuotaEvaluator {
        QuotaEvaluator::new(QuotaConfig::default(), ResetPolicy::utc())
    }

    fn account(created: DateTime<Utc>) -> QuotaAccount {
        QuotaAccount::new(
            SubjectId::parse("user-1").unwrap(),
            created,
            &ResetPolicy::utc(),
        )
    }

    #[test]
    fn test_fresh_account_is_eligible() {
        let now = at(2026, 10, 19, 10, 0);
        let mut acct = account(now);
        let result = evaluator().can_consume(&mut acct, now);
        assert!(result.eligible);
        assert_eq!(result.blocking_gate, None);
        assert_eq!(result.daily.remaining, 15);
        assert_eq!(result.monthly.remaining, 350);
        assert!(result.reason.contains("15 of 15 daily"));
    }

    #[test]
    fn test_daily_gate_exhausted() {
        let now = at(2026, 10, 19, 20, 0);
        let mut acct = account(at(2026, 10, 19, 8, 0));
        acct.daily_count = 15;
        acct.monthly_count = 15;

        let result = evaluator().can_consume(&mut acct, now);
        assert!(!result.eligible);
        assert_eq!(result.blocking_gate, Some(Gate::Daily));
        assert_eq!(result.daily.remaining, 0);
        assert_eq!(result.daily.resets_in_secs, 4 * 3600);
        assert!(result.reason.starts_with("Daily limit of 15"));
        assert!(result.reason.contains("4h 0m"));
        assert!(result.reason.contains("2026-10-20T00:00:00Z"));
    }

    #[test]
    fn test_daily_checked_before_monthly() {
        let now = at(2026, 10, 19, 20, 0);
        let mut acct = account(now);
        acct.daily_count = 15;
        acct.monthly_count = 350;
        let result = evaluator().can_consume(&mut acct, now);
        assert_eq!(result.blocking_gate, Some(Gate::Daily));
        assert!(result.monthly.is_exhausted());
    }

    #[test]
    fn test_monthly_gate_exhausted() {
        let now = at(2026, 10, 19, 20, 0);
        let mut acct = account(now);
        acct.daily_count = 2;
        acct.monthly_count = 350;
        let result = evaluator().can_consume(&mut acct, now);
        assert!(!result.eligible);
        assert_eq!(result.blocking_gate, Some(Gate::Monthly));
        assert!(result.reason.contains("free tier"));
        assert_eq!(result.monthly.resets_at, at(2026, 11, 1, 0, 0));
    }

    #[test]
    fn test_expired_premium_uses_free_limit() {
        let now = at(2026, 10, 19, 20, 0);
        let mut acct = account(now).with_premium(now - Duration::days(1));
        let result = evaluator().can_consume(&mut acct, now);
        assert_eq!(result.monthly.limit, 350);
        assert!(!result.tier.active);
        assert_eq!(result.tier.days_left, 0);
    }

    #[test]
    fn test_active_premium_limit_and_days_left() {
        let now = at(2026, 10, 19, 20, 0);
        let mut acct = account(now).with_premium(now + Duration::hours(36));
        let result = evaluator().can_consume(&mut acct, now);
        assert_eq!(result.monthly.limit, 1500);
        assert!(result.tier.active);
        assert_eq!(result.tier.days_left, 2);
    }

    #[test]
    fn test_stale_daily_window_resets_on_read() {
        let mut acct = account(at(2026, 10, 17, 9, 0));
        acct.daily_count = 15;
        acct.monthly_count = 15;

        let now = at(2026, 10, 19, 9, 0);
        let result = evaluator().can_consume(&mut acct, now);
        assert!(result.eligible);
        assert_eq!(acct.daily_count, 0);
        assert_eq!(acct.daily_anchor, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(acct.monthly_count, 15);
    }

    #[test]
    fn test_can_consume_never_increments() {
        let now = at(2026, 10, 19, 9, 0);
        let mut acct = account(now);
        for _ in 0..5 {
            evaluator().can_consume(&mut acct, now);
        }
        assert_eq!(acct.daily_count, 0);
        assert_eq!(acct.lifetime_count, 0);
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(0), "0s");
        assert_eq!(format_countdown(59), "59s");
        assert_eq!(format_countdown(61), "1m 1s");
        assert_eq!(format_countdown(3 * 3600 + 12 * 60), "3h 12m");
        assert_eq!(format_countdown(2 * 86_400 + 3 * 3600), "2d 3h");
    }
}
