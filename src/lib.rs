//! QuotaGuard Library
//!
//! Quota enforcement and usage accounting for tiered, time-windowed download
//! quotas: calendar-aligned daily and monthly windows, premium tiers with
//! expiry, replay protection and an append-only consumption ledger.

pub mod api;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod ids;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod quota;
pub mod store;

pub use catalog::{AccessPayload, Resource, ResourceCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::{
    ConsumptionOutcome, ConsumptionRequest, EngineConfig, GlobalStats, QuotaService, SubjectStats,
    SweepReport,
};
pub use error::{ErrorCode, QuotaError, Result};
pub use identity::{IdentityProvider, SubjectIdentity};
pub use ids::{ResourceId, SubjectId};
pub use ledger::{ClientMeta, ConsumptionRecord, HistoryPage, SourceChannel};
pub use quota::{QuotaAccount, QuotaCheckResult, QuotaConfig, QuotaEvaluator, ResetPolicy, Tier};
pub use store::{FileStore, MemoryStore, QuotaStore};
