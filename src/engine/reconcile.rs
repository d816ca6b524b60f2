//! History reconciliation.
//!
//! `merge` is the pure dedupe-and-sort step. `HistoryStore` owns the
//! canonical history: one reconciliation at a time, persisted before it
//! is published, each published change carrying a higher version.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::storage;
use crate::types::{DrawRecord, HistorySnapshot, StorageError};

/// Merge two record lists into canonical order.
///
/// `incoming` goes ahead of `current`, the first record seen for each
/// draw number wins, and the result is sorted by draw number descending.
/// `merge(h, h) == h` for any canonical `h`.
pub fn merge(incoming: &[DrawRecord], current: &[DrawRecord]) -> Vec<DrawRecord> {
    let mut seen = HashSet::with_capacity(incoming.len() + current.len());
    let mut merged: Vec<DrawRecord> = incoming
        .iter()
        .chain(current)
        .filter(|d| seen.insert(d.sequence()))
        .cloned()
        .collect();
    merged.sort_by(|a, b| b.cmp_by_id(a));
    merged
}

/// What one reconciliation did.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub snapshot: Arc<HistorySnapshot>,
    /// Draws not previously in the history.
    pub added: usize,
    /// Existing draws whose contents were replaced by the incoming copy.
    pub updated: usize,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        self.added + self.updated > 0
    }
}

/// Single owner of the canonical history.
pub struct HistoryStore {
    path: PathBuf,
    current: watch::Sender<Arc<HistorySnapshot>>,
    writer: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (current, _) = watch::channel(Arc::new(HistorySnapshot::empty()));
        Self {
            path: path.into(),
            current,
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<HistorySnapshot> {
        self.current.borrow().clone()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<HistorySnapshot>> {
        self.current.subscribe()
    }

    pub fn is_initialised(&self) -> bool {
        self.current.borrow().version > 0
    }

    /// Install the startup history (cache or seed data) without
    /// persisting it. Ignored if the store already holds a history.
    pub async fn install(&self, draws: Vec<DrawRecord>, version: u64) -> Arc<HistorySnapshot> {
        let _guard = self.writer.lock().await;
        if self.is_initialised() {
            debug!("History already initialised, ignoring install");
            return self.snapshot();
        }

        let snapshot = Arc::new(HistorySnapshot {
            version: version.max(1),
            draws: merge(&draws, &[]),
            updated_at: Utc::now(),
        });
        info!(version = snapshot.version, draws = snapshot.len(), "History installed");
        self.current.send_replace(snapshot.clone());
        snapshot
    }

    /// Merge `incoming` into the canonical history, persist it, then
    /// publish it. An unchanged history is neither written nor
    /// re-published. On a write failure the published history is kept.
    pub async fn reconcile(&self, incoming: &[DrawRecord]) -> Result<ReconcileOutcome, StorageError> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();

        let merged = merge(incoming, &current.draws);
        let (added, updated) = diff_counts(&current.draws, &merged);

        if added == 0 && updated == 0 {
            debug!(version = current.version, incoming = incoming.len(), "Reconciliation made no changes");
            return Ok(ReconcileOutcome { snapshot: current, added, updated });
        }

        let version = current.version + 1;
        let path = self.path.clone();
        let merged = tokio::task::spawn_blocking(move || {
            storage::save_history(&path, version, &merged).map(|_| merged)
        })
        .await
        .map_err(|e| StorageError::Io {
            path: self.path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })??;

        let snapshot = Arc::new(HistorySnapshot {
            version,
            draws: merged,
            updated_at: Utc::now(),
        });
        self.current.send_replace(snapshot.clone());

        info!(version, added, updated, total = snapshot.len(), "History reconciled");
        Ok(ReconcileOutcome { snapshot, added, updated })
    }
}

/// Count draws in `merged` that are new, or changed, relative to `current`.
fn diff_counts(current: &[DrawRecord], merged: &[DrawRecord]) -> (usize, usize) {
    let by_seq: HashMap<u64, &DrawRecord> = current.iter().map(|d| (d.sequence(), d)).collect();
    merged.iter().fold((0, 0), |(added, updated), d| match by_seq.get(&d.sequence()) {
        None => (added + 1, updated),
        Some(old) if *old != d => (added, updated + 1),
        Some(_) => (added, updated),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
