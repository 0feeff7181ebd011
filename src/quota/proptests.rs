//! Property-Based Tests for Quota Windows
//!
//! Invariants checked against random clocks and random consumption
//! sequences:
//!
//! - **Reset idempotence**: a second reset in the same calendar day is a no-op
//! - **Anchors**: after evaluation no anchor is ahead of the evaluation day
//! - **Safety**: gating every consumption on `can_consume` never lets a
//!   counter exceed its effective limit
//!
//! ```bash
//! cargo test --lib quota::proptests
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use super::{QuotaAccount, QuotaConfig, QuotaEvaluator, ResetPolicy};
use crate::ids::SubjectId;

fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    // 2020-01-01 .. 2030-01-01
    (1_577_836_800i64..1_893_456_000i64).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(Utc::now)
    })
}

fn fresh_account(created: DateTime<Utc>) -> QuotaAccount {
    QuotaAccount::new(
        SubjectId::parse("prop-subject").unwrap(),
        created,
        &ResetPolicy::utc(),
    )
}

/// One step of a random workload
#[derive(Debug, Clone)]
enum Step {
    Consume,
    AdvanceMinutes(i64),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        8 => Just(Step::Consume),
        1 => (1i64..3 * 24 * 60).prop_map(Step::AdvanceMinutes),
    ]
}

proptest! {
    #[test]
    fn prop_daily_reset_idempotent(
        created in arb_instant(),
        later_secs in 0i64..90 * 86_400,
        count in 0u32..100,
    ) {
        let policy = ResetPolicy::utc();
        let mut account = fresh_account(created);
        account.daily_count = count;

        let now = created + Duration::seconds(later_secs);
        policy.reset_daily_if_needed(&mut account, now);
        let after_first = account.clone();

        prop_assert!(!policy.reset_daily_if_needed(&mut account, now));
        prop_assert_eq!(after_first, account);
    }

    #[test]
    fn prop_anchors_never_ahead_after_evaluation(
        created in arb_instant(),
        later_secs in 0i64..400 * 86_400,
    ) {
        let evaluator = QuotaEvaluator::new(QuotaConfig::default(), ResetPolicy::utc());
        let mut account = fresh_account(created);
        let now = created + Duration::seconds(later_secs);

        evaluator.can_consume(&mut account, now);
        prop_assert_eq!(account.daily_anchor, evaluator.policy().local_date(now));
        prop_assert_eq!(account.monthly_anchor, evaluator.policy().local_month(now));
    }

    #[test]
    fn prop_gated_consumption_never_exceeds_limits(
        start in arb_instant(),
        daily_limit in 1u32..20,
        monthly_limit in 1u32..60,
        steps in prop::collection::vec(arb_step(), 1..400),
    ) {
        let config = QuotaConfig {
            daily_limit,
            free_monthly_limit: monthly_limit,
            premium_monthly_limit: monthly_limit,
            ..QuotaConfig::default()
        };
        let evaluator = QuotaEvaluator::new(config, ResetPolicy::utc());
        let mut account = fresh_account(start);
        let mut now = start;

        for step in steps {
            match step {
                Step::Consume => {
                    let status = evaluator.can_consume(&mut account, now);
                    if status.eligible {
                        account.record_consumption();
                    }
                }
                Step::AdvanceMinutes(minutes) => now += Duration::minutes(minutes),
            }
            prop_assert!(account.daily_count <= daily_limit);
            prop_assert!(account.monthly_count <= monthly_limit);
        }
    }
}
