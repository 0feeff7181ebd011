//! Quota Account
//!
//! Small, mutable per-subject counter record. The consumption history lives
//! in the ledger, not here.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::reset::ResetPolicy;
use crate::error::QuotaError;
use crate::ids::SubjectId;

/// Subscription tier controlling quota magnitude
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Free => write!(f, "free"),
            Tier::Premium => write!(f, "premium"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            _ => Err(format!("Invalid tier: {}", s)),
        }
    }
}

/// Calendar month token, rendered as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Returns `None` when `month` is outside 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month containing `date`
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following calendar month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First calendar day of the month
    pub fn first_day(&self) -> NaiveDate {
        // month is validated on construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QuotaError::invalid("year_month", format!("expected YYYY-MM, got {:?}", s));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        YearMonth::new(year, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = QuotaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Per-subject quota counters and tier state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaAccount {
    /// Owning subject
    pub subject_id: SubjectId,

    /// Consumptions in the current calendar day
    pub daily_count: u32,

    /// Calendar day the daily counter belongs to
    pub daily_anchor: NaiveDate,

    /// Consumptions in the current calendar month
    pub monthly_count: u32,

    /// Calendar month the monthly counter belongs to
    pub monthly_anchor: YearMonth,

    /// Consumptions since the account was created, never decreases
    pub lifetime_count: u64,

    /// Subscription tier
    pub tier: Tier,

    /// End of the paid premium period
    pub tier_expiry: Option<DateTime<Utc>>,

    /// When the subject was created
    pub created_at: DateTime<Utc>,

    /// Bumped on every counter mutation
    #[serde(default)]
    pub version: u64,
}

impl QuotaAccount {
    /// Create a free-tier account anchored to the calendar of `created_at`
    pub fn new(subject_id: SubjectId, created_at: DateTime<Utc>, policy: &ResetPolicy) -> Self {
        let today = policy.local_date(created_at);
        Self {
            subject_id,
            daily_count: 0,
            daily_anchor: today,
            monthly_count: 0,
            monthly_anchor: YearMonth::of(today),
            lifetime_count: 0,
            tier: Tier::Free,
            tier_expiry: None,
            created_at,
            version: 0,
        }
    }

    /// Builder-style premium upgrade
    pub fn with_premium(mut self, expiry: DateTime<Utc>) -> Self {
        self.tier = Tier::Premium;
        self.tier_expiry = Some(expiry);
        self
    }

    /// Premium only counts while its expiry lies in the future
    pub fn premium_active(&self, now: DateTime<Utc>) -> bool {
        self.tier == Tier::Premium && self.tier_expiry.is_some_and(|expiry| expiry > now)
    }

    /// Count one accepted consumption against every window
    pub fn record_consumption(&mut self) {
        self.daily_count = self.daily_count.saturating_add(1);
        self.monthly_count = self.monthly_count.saturating_add(1);
        self.lifetime_count = self.lifetime_count.saturating_add(1);
        self.version += 1;
    }

    /// Copy window bookkeeping and counters, leaving tier fields alone
    pub fn apply_counters_from(&mut self, other: &QuotaAccount) {
        self.daily_count = other.daily_count;
        self.daily_anchor = other.daily_anchor;
        self.monthly_count = other.monthly_count;
        self.monthly_anchor = other.monthly_anchor;
        self.lifetime_count = other.lifetime_count;
    }
}
