//! File-backed quota store
//!
//! Two files sit side by side. The consumption ledger is a JSON Lines file
//! that only ever grows: each commit appends one line and syncs it. The
//! subjects, accounts and resources are small and live in a JSON snapshot
//! that is rewritten through a temporary file and a rename. The snapshot
//! records how many ledger lines it covers.
//!
//! A commit appends to the ledger first and rewrites the snapshot second.
//! If the snapshot write fails the ledger is cut back to its previous length
//! and nothing becomes visible. Lines past the covered length, left behind
//! by a crash between the two writes, are dropped on open.
//!
//! File writes are synchronous while the write lock is held, so a cancelled
//! caller can never observe half of a commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::state::{StoreState, Tables};
use super::{ConsumptionCommit, QuotaStore};
use crate::catalog::{Resource, ResourceCatalog};
use crate::error::{QuotaError, Result};
use crate::identity::{IdentityProvider, SubjectIdentity};
use crate::ids::{ResourceId, SubjectId};
use crate::ledger::{ConsumptionRecord, HistoryPage, PageRequest};
use crate::metrics;
use crate::quota::{QuotaAccount, ResetPolicy, Tier};

/// Append-only JSON Lines ledger
#[derive(Debug)]
struct LedgerFile {
    path: PathBuf,
    /// Bytes covered by the published state
    len: u64,
}

impl LedgerFile {
    /// Load the first `expected` records, dropping anything after them
    fn load(path: PathBuf, expected: u64) -> Result<(Self, Vec<ConsumptionRecord>)> {
        if !path.exists() {
            if expected > 0 {
                return Err(QuotaError::Persistence(format!(
                    "Ledger {} is missing but the snapshot covers {} records",
                    path.display(),
                    expected
                )));
            }
            return Ok((Self { path, len: 0 }, Vec::new()));
        }

        let file = File::open(&path).map_err(|e| {
            QuotaError::Persistence(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let on_disk = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset = 0u64;
        let mut line = Vec::new();

        while (records.len() as u64) < expected {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 || line.last() != Some(&b'\n') {
                return Err(QuotaError::Persistence(format!(
                    "Ledger {} holds {} of {} records",
                    path.display(),
                    records.len(),
                    expected
                )));
            }
            let record: ConsumptionRecord = serde_json::from_slice(&line).map_err(|e| {
                QuotaError::Persistence(format!(
                    "Failed to parse {} line {}: {}",
                    path.display(),
                    records.len() + 1,
                    e
                ))
            })?;
            records.push(record);
            offset += read as u64;
        }

        let ledger = Self { path, len: offset };
        if on_disk > offset {
            warn!(
                "Dropping {} uncommitted bytes from {}",
                on_disk - offset,
                ledger.path.display()
            );
            ledger.truncate()?;
        }
        Ok((ledger, records))
    }

    /// Append one record and sync it; returns the new length
    fn append(&self, record: &ConsumptionRecord) -> Result<u64> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if file.metadata()?.len() != self.len {
            file.set_len(self.len)?;
        }
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(self.len + line.len() as u64)
    }

    /// Cut the file back to the published length
    fn truncate(&self) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .open(&self.path)?
            .set_len(self.len)?;
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    state: StoreState,
    ledger: LedgerFile,
}

/// Durable store persisted as a tables snapshot plus an append-only ledger
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl FileStore {
    /// Open the snapshot at `path`, starting empty when it does not exist
    ///
    /// The ledger lives next to it with a `.ledger.jsonl` extension.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                QuotaError::Persistence(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let tables: Tables = serde_json::from_str(&content).map_err(|e| {
                QuotaError::Persistence(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            info!("Loaded quota state from {}", path.display());
            tables
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            info!("Starting with empty quota state at {}", path.display());
            Tables::default()
        };

        let (ledger, records) = LedgerFile::load(ledger_path(&path), tables.ledger_len())?;
        debug!("Replayed {} ledger records", records.len());

        Ok(Self {
            path,
            inner: RwLock::new(Inner {
                state: StoreState::from_parts(tables, records),
                ledger,
            }),
        })
    }

    /// Snapshot location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ledger location
    pub fn ledger_path(&self) -> PathBuf {
        ledger_path(&self.path)
    }

    /// Register a subject together with its quota account
    pub async fn register_subject(
        &self,
        identity: SubjectIdentity,
        account: QuotaAccount,
    ) -> Result<()> {
        self.mutate(|tables| tables.register_subject(identity, account))
            .await
    }

    /// Add a resource to the catalog
    pub async fn register_resource(&self, resource: Resource) -> Result<()> {
        self.mutate(|tables| tables.register_resource(resource)).await
    }

    /// Stage `apply` on a copy of the tables, persist it, then publish it
    async fn mutate<T>(&self, apply: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.write().await;
        let mut staged = guard.state.tables.clone();
        let value = apply(&mut staged)?;
        self.persist(&staged)?;
        guard.state.tables = staged;
        Ok(value)
    }

    fn persist(&self, tables: &Tables) -> Result<()> {
        let write = || -> Result<()> {
            let json = serde_json::to_vec_pretty(tables)?;
            let tmp = self.path.with_extension("json.tmp");
            fs::write(&tmp, json)?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        };

        write().map_err(|e| self.failed(e))?;
        debug!("Persisted quota state to {}", self.path.display());
        Ok(())
    }

    fn failed(&self, e: QuotaError) -> QuotaError {
        metrics::PERSISTENCE_FAILURES_TOTAL.inc();
        error!("Failed to persist quota state to {}: {}", self.path.display(), e);
        e
    }
}

fn ledger_path(snapshot: &Path) -> PathBuf {
    snapshot.with_extension("ledger.jsonl")
}

#[async_trait]
impl QuotaStore for FileStore {
    async fn account(&self, subject_id: &SubjectId) -> Result<Option<QuotaAccount>> {
        Ok(self.inner.read().await.state.tables.account(subject_id))
    }

    async fn accounts(&self) -> Result<Vec<QuotaAccount>> {
        Ok(self.inner.read().await.state.tables.accounts())
    }

    async fn refresh_windows(
        &self,
        subject_id: &SubjectId,
        policy: &ResetPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<QuotaAccount>> {
        // write only when a window actually rolls over
        {
            let inner = self.inner.read().await;
            if !inner.state.tables.windows_stale(subject_id, policy, now) {
                return Ok(inner.state.tables.account(subject_id));
            }
        }
        self.mutate(|tables| Ok(tables.refresh_windows(subject_id, policy, now)))
            .await
    }

    async fn set_tier(
        &self,
        subject_id: &SubjectId,
        tier: Tier,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<QuotaAccount> {
        self.mutate(|tables| tables.set_tier(subject_id, tier, expiry))
            .await
    }

    async fn expire_tiers(&self, now: DateTime<Utc>) -> Result<Vec<SubjectId>> {
        if self.inner.read().await.state.tables.lapsed_premium(now).is_empty() {
            return Ok(Vec::new());
        }
        self.mutate(|tables| Ok(tables.expire_tiers(now))).await
    }

    async fn latest_record(
        &self,
        subject_id: &SubjectId,
        resource_id: &ResourceId,
    ) -> Result<Option<ConsumptionRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .state
            .latest_record(subject_id, resource_id))
    }

    async fn history(&self, subject_id: &SubjectId, page: PageRequest) -> Result<HistoryPage> {
        Ok(self.inner.read().await.state.history(subject_id, page))
    }

    async fn records_for(&self, subject_id: &SubjectId) -> Result<Vec<ConsumptionRecord>> {
        Ok(self.inner.read().await.state.records_for(subject_id))
    }

    async fn all_records(&self) -> Result<Vec<ConsumptionRecord>> {
        Ok(self.inner.read().await.state.all_records())
    }

    async fn resource_counters(&self) -> Result<Vec<(ResourceId, u64)>> {
        Ok(self.inner.read().await.state.tables.resource_counters())
    }

    async fn commit(&self, commit: ConsumptionCommit) -> Result<()> {
        let mut guard = self.inner.write().await;
        let mut staged = guard.state.tables.clone();
        staged.apply_commit(&commit)?;

        let ledger_len = guard.ledger.append(&commit.record).map_err(|e| self.failed(e))?;
        if let Err(e) = self.persist(&staged) {
            if let Err(undo) = guard.ledger.truncate() {
                // reopen drops the orphaned line
                warn!("Failed to roll back ledger append: {}", undo);
            }
            return Err(e);
        }

        guard.ledger.len = ledger_len;
        guard.state.tables = staged;
        guard.state.push_record(commit.record);
        Ok(())
    }
}

#[async_trait]
impl ResourceCatalog for FileStore {
    async fn resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        Ok(self.inner.read().await.state.tables.resource(id))
    }
}

#[async_trait]
impl IdentityProvider for FileStore {
    async fn identity(&self, subject_id: &SubjectId) -> Result<Option<SubjectIdentity>> {
        Ok(self.inner.read().await.state.tables.identity(subject_id))
    }
}
