//! Quota Windows and Eligibility
//!
//! This module holds the per-subject quota account, the lazy window rollover
//! logic and the read-only eligibility evaluator.
//!
//! # Windows
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Quota Evaluator                         │
//! ├────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐    │
//! │  │ Daily gate   │ → │ Monthly gate │ → │ Tier status  │    │
//! │  │ (all tiers)  │   │ (free/prem.) │   │              │    │
//! │  └──────────────┘   └──────────────┘   └──────────────┘    │
//! ├────────────────────────────────────────────────────────────┤
//! │        Reset Policy (lazy rollover, daily then monthly)     │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Counters roll over on access; no background job is needed for
//! correctness.

pub mod account;
pub mod config;
pub mod evaluator;
pub mod reset;

#[cfg(test)]
mod proptests;

pub use account::{QuotaAccount, Tier, YearMonth};
pub use config::QuotaConfig;
pub use evaluator::{
    format_countdown, Gate, QuotaCheckResult, QuotaEvaluator, TierStatus, WindowStatus,
};
pub use reset::{ResetPolicy, WindowReset};
