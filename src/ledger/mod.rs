//! Consumption Ledger
//!
//! Append-only audit trail of accepted consumptions, kept apart from the
//! mutable quota counters so it can be retained and indexed on its own.

pub mod dedup;
pub mod record;

pub use dedup::DedupGuard;
pub use record::{
    ClientMeta, ConsumptionRecord, HistoryPage, PageRequest, SourceChannel, MAX_PAGE_SIZE,
};
