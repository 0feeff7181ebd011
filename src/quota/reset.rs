//! Window Reset Policy
//!
//! Stateless rollover of daily and monthly counters. Both resets run, daily
//! first, before any counter is read or mutated.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use super::account::{QuotaAccount, YearMonth};

/// Which windows were rolled over by [`ResetPolicy::apply`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowReset {
    pub daily: bool,
    pub monthly: bool,
}

impl WindowReset {
    pub fn any(&self) -> bool {
        self.daily || self.monthly
    }
}

/// Calendar-based window rollover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPolicy {
    offset: FixedOffset,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self::utc()
    }
}

impl ResetPolicy {
    /// Calendar days in UTC
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Calendar days in a fixed offset
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar day of `now`
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Calendar month of `now`
    pub fn local_month(&self, now: DateTime<Utc>) -> YearMonth {
        YearMonth::of(self.local_date(now))
    }

    /// Zero the daily counter when its anchor day precedes today
    pub fn reset_daily_if_needed(&self, account: &mut QuotaAccount, now: DateTime<Utc>) -> bool {
        let today = self.local_date(now);
        if account.daily_anchor < today {
            account.daily_count = 0;
            account.daily_anchor = today;
            account.version += 1;
            true
        } else {
            false
        }
    }

    /// Zero the monthly counter when its anchor month differs from this month
    pub fn reset_monthly_if_needed(&self, account: &mut QuotaAccount, now: DateTime<Utc>) -> bool {
        let month = self.local_month(now);
        if account.monthly_anchor != month {
            account.monthly_count = 0;
            account.monthly_anchor = month;
            account.version += 1;
            true
        } else {
            false
        }
    }

    /// Run both resets in order
    pub fn apply(&self, account: &mut QuotaAccount, now: DateTime<Utc>) -> WindowReset {
        let daily = self.reset_daily_if_needed(account, now);
        let monthly = self.reset_monthly_if_needed(account, now);
        WindowReset { daily, monthly }
    }

    /// Start of the next calendar day
    pub fn next_daily_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tomorrow = self.local_date(now) + Duration::days(1);
        self.midnight(tomorrow)
    }

    /// Start of the next calendar month
    pub fn next_monthly_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(self.local_month(now).next().first_day())
    }

    /// Local midnight of `date` as a UTC instant
    fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(NaiveTime::MIN);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SubjectId;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn account_at(created: DateTime<Utc>) -> QuotaAccount {
        QuotaAccount::new(
            SubjectId::parse("user-1").unwrap(),
            created,
            &ResetPolicy::utc(),
        )
    }

    #[test]
    fn test_daily_reset_is_idempotent_within_a_day() {
        let policy = ResetPolicy::utc();
        let mut account = account_at(at(2026, 10, 17, 9, 0));
        account.daily_count = 7;

        let now = at(2026, 10, 19, 8, 0);
        assert!(policy.reset_daily_if_needed(&mut account, now));
        assert_eq!(account.daily_count, 0);

        account.daily_count = 3;
        assert!(!policy.reset_daily_if_needed(&mut account, at(2026, 10, 19, 23, 59)));
        assert_eq!(account.daily_count, 3);
    }

    #[test]
    fn test_no_daily_reset_on_same_day() {
        let policy = ResetPolicy::utc();
        let mut account = account_at(at(2026, 10, 19, 0, 0));
        account.daily_count = 4;
        assert!(!policy.reset_daily_if_needed(&mut account, at(2026, 10, 19, 23, 0)));
        assert_eq!(account.daily_count, 4);
    }

    #[test]
    fn test_monthly_reset_on_month_change() {
        let policy = ResetPolicy::utc();
        let mut account = account_at(at(2026, 9, 30, 23, 0));
        account.monthly_count = 120;

        let reset = policy.apply(&mut account, at(2026, 10, 1, 0, 5));
        assert!(reset.daily);
        assert!(reset.monthly);
        assert_eq!(account.monthly_count, 0);
        assert_eq!(account.monthly_anchor.to_string(), "2026-10");
    }

    #[test]
    fn test_monthly_reset_not_triggered_within_month() {
        let policy = ResetPolicy::utc();
        let mut account = account_at(at(2026, 10, 1, 0, 0));
        account.monthly_count = 40;
        let reset = policy.apply(&mut account, at(2026, 10, 31, 23, 59));
        assert!(reset.daily);
        assert!(!reset.monthly);
        assert_eq!(account.monthly_count, 40);
    }

    #[test]
    fn test_reset_bumps_version() {
        let policy = ResetPolicy::utc();
        let mut account = account_at(at(2026, 10, 18, 12, 0));
        let before = account.version;
        policy.apply(&mut account, at(2026, 10, 19, 12, 0));
        assert_eq!(account.version, before + 1);
    }

    #[test]
    fn test_next_boundaries_utc() {
        let policy = ResetPolicy::utc();
        let now = at(2026, 12, 31, 18, 30);
        assert_eq!(policy.next_daily_reset(now), at(2027, 1, 1, 0, 0));
        assert_eq!(policy.next_monthly_reset(now), at(2027, 1, 1, 0, 0));
    }

    #[test]
    fn test_offset_calendar() {
        // UTC+03:00: 22:00 UTC is already the next local day
        let policy = ResetPolicy::with_offset(FixedOffset::east_opt(3 * 3600).unwrap());
        let now = at(2026, 10, 19, 22, 0);
        assert_eq!(
            policy.local_date(now),
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
        );
        assert_eq!(policy.next_daily_reset(now), at(2026, 10, 20, 21, 0));
        assert_eq!(policy.next_monthly_reset(now), at(2026, 10, 31, 21, 0));
    }
}
