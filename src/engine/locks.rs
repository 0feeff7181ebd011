//! Per-subject writer locks
//!
//! One async mutex per subject serializes consumptions for that subject while
//! leaving different subjects fully parallel. Reads never take these locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::ids::SubjectId;
use crate::metrics;

/// Lazily populated table of subject locks
#[derive(Debug, Default)]
pub struct SubjectLocks {
    table: Mutex<HashMap<SubjectId, Arc<AsyncMutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, subject_id: &SubjectId) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let lock = table
            .entry(subject_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        metrics::SUBJECT_LOCKS_ACTIVE.set(table.len() as i64);
        lock
    }

    /// Wait for exclusive write access to `subject_id`
    pub async fn acquire(&self, subject_id: &SubjectId) -> OwnedMutexGuard<()> {
        self.entry(subject_id).lock_owned().await
    }

    /// Drop locks nobody holds or waits on; returns how many were removed
    pub fn prune(&self) -> usize {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let before = table.len();
        table.retain(|_, lock| Arc::strong_count(lock) > 1);
        metrics::SUBJECT_LOCKS_ACTIVE.set(table.len() as i64);
        before - table.len()
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
