//! Quota Engine
//!
//! Orchestrates the quota model, the ledger and the store:
//!
//! - `service`: exposed operations (status, history, consume, stats, sweep)
//! - `transaction`: the atomic consume algorithm
//! - `locks`: per-subject writer serialization
//! - `retry`: backoff after commit conflicts
//! - `stats`: read-only usage reporting
//! - `sweep`: periodic tier expiry

pub mod config;
pub mod locks;
pub mod retry;
pub mod service;
pub mod stats;
pub mod sweep;
pub mod transaction;

pub use config::EngineConfig;
pub use locks::SubjectLocks;
pub use service::{QuotaService, SweepReport};
pub use stats::{GlobalStats, PeakDay, PeakHour, ResourceUsage, StatsAggregator, SubjectStats};
pub use sweep::{spawn_tier_sweeper, SweepConfig};
pub use transaction::{ConsumptionOutcome, ConsumptionRequest, ConsumptionTransaction, Denial};
