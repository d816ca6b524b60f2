//! Sync orchestrator.
//!
//! Runs the startup/resync sequence: local cache (only while the store
//! is uninitialised, falling back to seed data), then each remote source
//! in order. Every non-empty result is reconciled into the store. One
//! run at a time: a trigger that arrives mid-run waits for it and gets
//! its report instead of starting another.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::reconcile::{HistoryStore, ReconcileOutcome};
use crate::config::AppConfig;
use crate::sources::cache::CacheSource;
use crate::sources::http::HttpFetcher;
use crate::sources::remote_csv::RemoteCsvSource;
use crate::sources::scraped::ScrapedSource;
use crate::sources::seed::seed_draws;
use crate::sources::DrawSource;
use crate::types::{DrawRecord, StorageError};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// At least one remote source delivered records that were reconciled.
    Succeeded,
    /// No remote source delivered anything. The history is unchanged
    /// apart from the startup cache/seed install.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageResult {
    Skipped,
    Empty,
    Seeded { draws: usize },
    Loaded { draws: usize, version: u64 },
    Merged { fetched: usize, added: usize, updated: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    #[serde(flatten)]
    pub result: StageResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: SyncOutcome,
    pub stages: Vec<StageReport>,
    /// History version and size after the run.
    pub version: u64,
    pub total_draws: usize,
    /// True when this caller joined a run already in progress.
    pub coalesced: bool,
}

/// Published after every state change of the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub syncing: bool,
    pub last_report: Option<SyncReport>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator {
    store: Arc<HistoryStore>,
    cache: CacheSource,
    remotes: Vec<Box<dyn DrawSource>>,
    status: watch::Sender<SyncStatus>,
    run_lock: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<HistoryStore>, cache: CacheSource) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            cache,
            remotes: Vec::new(),
            status,
            run_lock: Mutex::new(()),
        }
    }

    /// Append a remote stage. Stages run in the order they were added.
    pub fn with_source(mut self, source: Box<dyn DrawSource>) -> Self {
        self.remotes.push(source);
        self
    }

    /// Build the production pipeline: cache, remote CSV, scraped table.
    pub fn from_config(cfg: &AppConfig, store: Arc<HistoryStore>) -> Result<Self> {
        let cache = CacheSource::new(store.path().to_path_buf());
        let mut orchestrator = Self::new(store, cache);

        let csv = RemoteCsvSource::new(HttpFetcher::new()?, &cfg.sources.csv);
        if csv.is_configured() {
            orchestrator = orchestrator.with_source(Box::new(csv));
        }
        if cfg.sources.scraped.enabled {
            let scraped = ScrapedSource::new(HttpFetcher::new()?, cfg.sources.scraped.clone())?;
            orchestrator = orchestrator.with_source(Box::new(scraped));
        }

        info!(
            stages = ?orchestrator.remotes.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Sync pipeline ready"
        );
        Ok(orchestrator)
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Install the cached (or seed) history if the store is empty.
    /// Runs on its own so callers can serve data before the first
    /// network round completes.
    pub async fn bootstrap(&self) -> StageReport {
        let _guard = self.run_lock.lock().await;
        self.cache_stage().await
    }

    /// Trigger a sync. If one is already running, wait for it and
    /// return its report.
    pub async fn sync(&self) -> SyncReport {
        if let Ok(_guard) = self.run_lock.try_lock() {
            return self.run().await;
        }

        debug!("Sync already in progress, joining it");
        let before = self.last_run_id();
        let _guard = self.run_lock.lock().await;
        let last = self.status.borrow().last_report.clone();
        match last {
            // The in-flight run finished: share its report.
            Some(report) if Some(&report.run_id) != before.as_ref() => {
                SyncReport { coalesced: true, ..report }
            }
            // It was cancelled before reporting.
            _ => self.run().await,
        }
    }

    fn last_run_id(&self) -> Option<String> {
        self.status.borrow().last_report.as_ref().map(|r| r.run_id.clone())
    }

    /// Reconcile manually supplied records (CSV import, manual entry).
    pub async fn import(&self, draws: &[DrawRecord]) -> Result<ReconcileOutcome, StorageError> {
        let outcome = self.store.reconcile(draws).await?;
        info!(
            records = draws.len(),
            added = outcome.added,
            updated = outcome.updated,
            version = outcome.snapshot.version,
            "Manual import reconciled"
        );
        Ok(outcome)
    }

    async fn run(&self) -> SyncReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let _syncing = SyncingFlag::raise(&self.status);
        info!(run_id = %run_id, "Sync started");

        let mut stages = vec![self.cache_stage().await];
        for source in &self.remotes {
            stages.push(self.remote_stage(source.as_ref()).await);
        }

        let succeeded = stages
            .iter()
            .skip(1)
            .any(|s| matches!(s.result, StageResult::Merged { .. }));
        let outcome = if succeeded { SyncOutcome::Succeeded } else { SyncOutcome::Failed };

        let snapshot = self.store.snapshot();
        let report = SyncReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcome,
            stages,
            version: snapshot.version,
            total_draws: snapshot.len(),
            coalesced: false,
        };

        match outcome {
            SyncOutcome::Succeeded => info!(
                run_id = %report.run_id,
                version = report.version,
                total_draws = report.total_draws,
                "Sync finished"
            ),
            SyncOutcome::Failed => warn!(
                run_id = %report.run_id,
                version = report.version,
                total_draws = report.total_draws,
                "Sync failed: no remote source delivered records"
            ),
        }

        self.status.send_modify(|s| {
            s.syncing = false;
            s.last_report = Some(report.clone());
        });
        report
    }

    async fn cache_stage(&self) -> StageReport {
        let result = if self.store.is_initialised() {
            StageResult::Skipped
        } else {
            match self.cache.load().await {
                Some(cached) if !cached.draws.is_empty() => {
                    let snapshot = self.store.install(cached.draws, cached.version).await;
                    StageResult::Loaded { draws: snapshot.len(), version: snapshot.version }
                }
                _ => {
                    info!("No usable cache, installing seed history");
                    let snapshot = self.store.install(seed_draws(), 1).await;
                    StageResult::Seeded { draws: snapshot.len() }
                }
            }
        };
        StageReport { stage: self.cache.name().to_string(), result }
    }

    async fn remote_stage(&self, source: &dyn DrawSource) -> StageReport {
        let name = source.name().to_string();
        let result = match source.fetch().await {
            Ok(draws) if draws.is_empty() => {
                debug!(stage = %name, "Source returned no records");
                StageResult::Empty
            }
            Ok(draws) => match self.store.reconcile(&draws).await {
                Ok(outcome) => StageResult::Merged {
                    fetched: draws.len(),
                    added: outcome.added,
                    updated: outcome.updated,
                },
                Err(e) => {
                    warn!(stage = %name, error = %e, "Failed to persist reconciled history");
                    StageResult::Failed { error: e.to_string() }
                }
            },
            Err(e) => {
                warn!(stage = %name, error = %e, "Source failed");
                StageResult::Failed { error: e.to_string() }
            }
        };
        StageReport { stage: name, result }
    }
}

/// Holds `syncing` up for the lifetime of a run, including a run whose
/// future is dropped midway.
struct SyncingFlag<'a> {
    status: &'a watch::Sender<SyncStatus>,
}

impl<'a> SyncingFlag<'a> {
    fn raise(status: &'a watch::Sender<SyncStatus>) -> Self {
        status.send_modify(|s| s.syncing = true);
        Self { status }
    }
}

impl Drop for SyncingFlag<'_> {
    fn drop(&mut self) {
        self.status.send_if_modified(|s| std::mem::replace(&mut s.syncing, false));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;
    use crate::types::{draw, SourceError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct StubSource {
        name: &'static str,
        result: Result<Vec<DrawRecord>, SourceError>,
        calls: Arc<AtomicUsize>,
        gate: Option<Arc<Notify>>,
    }

    impl StubSource {
        fn ok(name: &'static str, draws: Vec<DrawRecord>) -> Self {
            Self { name, result: Ok(draws), calls: Arc::default(), gate: None }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                result: Err(SourceError::Transport {
                    source_name: name.to_string(),
                    message: "connection reset".to_string(),
                }),
                calls: Arc::default(),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl DrawSource for StubSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self) -> Result<Vec<DrawRecord>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result.clone()
        }
    }

    fn d(id: &str) -> DrawRecord {
        draw(id, "2024-05-01", [2, 4, 6, 8, 10], [1, 3])
    }

    fn setup() -> (tempfile::TempDir, Arc<HistoryStore>, CacheSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let store = Arc::new(HistoryStore::new(&path));
        (dir, store, CacheSource::new(&path))
    }

    #[tokio::test]
    async fn test_seeds_when_cache_missing() {
        let (_dir, store, cache) = setup();
        let orchestrator = SyncOrchestrator::new(store.clone(), cache);
        let report = orchestrator.sync().await;

        assert_eq!(report.stages[0].stage, "cache");
        assert_eq!(report.stages[0].result, StageResult::Seeded { draws: 5 });
        assert_eq!(report.outcome, SyncOutcome::Failed);
        assert_eq!(store.snapshot().len(), 5);
        assert_eq!(store.snapshot().draws[0].id(), "24025");
    }

    #[tokio::test]
    async fn test_loads_cache_with_its_version() {
        let (_dir, store, cache) = setup();
        storage::save_history(store.path(), 9, &[d("100"), d("99")]).unwrap();

        let orchestrator = SyncOrchestrator::new(store.clone(), cache);
        let stage = orchestrator.bootstrap().await;
        assert_eq!(stage.result, StageResult::Loaded { draws: 2, version: 9 });

        // Already initialised: the cache stage is skipped from now on.
        let report = orchestrator.sync().await;
        assert_eq!(report.stages[0].result, StageResult::Skipped);
    }

    #[tokio::test]
    async fn test_remote_records_are_reconciled() {
        let (_dir, store, cache) = setup();
        let orchestrator = SyncOrchestrator::new(store.clone(), cache)
            .with_source(Box::new(StubSource::ok("remote-csv", vec![])))
            .with_source(Box::new(StubSource::ok("scraped", vec![d("24026"), d("24025")])));

        let report = orchestrator.sync().await;
        assert_eq!(report.outcome, SyncOutcome::Succeeded);
        assert_eq!(report.stages[1].result, StageResult::Empty);
        assert_eq!(
            report.stages[2].result,
            StageResult::Merged { fetched: 2, added: 1, updated: 1 }
        );
        assert_eq!(report.total_draws, 6);
        assert_eq!(report.version, 2);
        assert_eq!(store.snapshot().draws[0].id(), "24026");
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_failed_source_does_not_stop_later_ones() {
        let (_dir, store, cache) = setup();
        let orchestrator = SyncOrchestrator::new(store.clone(), cache)
            .with_source(Box::new(StubSource::failing("remote-csv")))
            .with_source(Box::new(StubSource::ok("scraped", vec![d("30000")])));

        let report = orchestrator.sync().await;
        assert!(matches!(report.stages[1].result, StageResult::Failed { .. }));
        assert_eq!(report.outcome, SyncOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_all_sources_failing_keeps_history() {
        let (_dir, store, cache) = setup();
        let orchestrator = SyncOrchestrator::new(store.clone(), cache)
            .with_source(Box::new(StubSource::failing("scraped")));

        let report = orchestrator.sync().await;
        assert_eq!(report.outcome, SyncOutcome::Failed);
        assert_eq!(store.snapshot().version, 1);
        assert_eq!(store.snapshot().len(), 5);
    }

    #[tokio::test]
    async fn test_status_is_published() {
        let (_dir, store, cache) = setup();
        let orchestrator = SyncOrchestrator::new(store, cache);
        let mut rx = orchestrator.subscribe_status();
        assert!(rx.borrow().last_report.is_none());

        let report = orchestrator.sync().await;
        assert!(rx.has_changed().unwrap());
        let status = rx.borrow_and_update().clone();
        assert!(!status.syncing);
        assert_eq!(status.last_report.unwrap().run_id, report.run_id);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let (_dir, store, cache) = setup();
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = StubSource {
            name: "scraped",
            result: Ok(vec![d("40000")]),
            calls: calls.clone(),
            gate: Some(gate.clone()),
        };
        let orchestrator = Arc::new(SyncOrchestrator::new(store, cache).with_source(Box::new(slow)));

        let mut status = orchestrator.subscribe_status();
        let first = tokio::spawn({
            let o = orchestrator.clone();
            async move { o.sync().await }
        });
        status.wait_for(|s| s.syncing).await.unwrap();

        let second = tokio::spawn({
            let o = orchestrator.clone();
            async move { o.sync().await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.run_id, b.run_id);
        assert!(!a.coalesced);
        assert!(b.coalesced);
    }

    #[tokio::test]
    async fn test_cancelled_sync_clears_syncing() {
        let (_dir, store, cache) = setup();
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = StubSource {
            name: "scraped",
            result: Ok(vec![d("40000")]),
            calls: calls.clone(),
            gate: Some(gate.clone()),
        };
        let orchestrator = Arc::new(SyncOrchestrator::new(store.clone(), cache).with_source(Box::new(slow)));

        let mut status = orchestrator.subscribe_status();
        let task = tokio::spawn({
            let o = orchestrator.clone();
            async move { o.sync().await }
        });
        status.wait_for(|s| s.syncing).await.unwrap();
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let after = orchestrator.status();
        assert!(!after.syncing);
        assert!(after.last_report.is_none());

        // The next trigger starts a fresh run instead of reusing a stale report.
        gate.notify_one();
        let report = orchestrator.sync().await;
        assert!(!report.coalesced);
        assert_eq!(report.outcome, SyncOutcome::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.snapshot().draws[0].id(), "40000");
    }

    #[tokio::test]
    async fn test_waiter_reruns_after_cancelled_sync() {
        let (_dir, store, cache) = setup();
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = StubSource {
            name: "scraped",
            result: Ok(vec![d("40000")]),
            calls: calls.clone(),
            gate: Some(gate.clone()),
        };
        let orchestrator = Arc::new(SyncOrchestrator::new(store, cache).with_source(Box::new(slow)));

        let mut status = orchestrator.subscribe_status();
        let first = tokio::spawn({
            let o = orchestrator.clone();
            async move { o.sync().await }
        });
        status.wait_for(|s| s.syncing).await.unwrap();

        let second = tokio::spawn({
            let o = orchestrator.clone();
            async move { o.sync().await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        first.abort();
        let _ = first.await;
        gate.notify_one();

        let report = second.await.unwrap();
        assert!(!report.coalesced);
        assert_eq!(report.outcome, SyncOutcome::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_corrupt_cache_installs_seed() {
        let (_dir, store, cache) = setup();
        std::fs::write(store.path(), "[[[").unwrap();

        let orchestrator = SyncOrchestrator::new(store.clone(), cache);
        let stage = orchestrator.bootstrap().await;
        assert_eq!(stage.stage, "cache");
        assert_eq!(stage.result, StageResult::Seeded { draws: 5 });
        assert_eq!(store.snapshot().version, 1);
        assert_eq!(store.snapshot().draws[0].id(), "24025");
    }

    #[tokio::test]
    async fn test_import_reconciles() {
        let (_dir, store, cache) = setup();
        let orchestrator = SyncOrchestrator::new(store.clone(), cache);
        orchestrator.bootstrap().await;

        let outcome = orchestrator.import(&[d("50000")]).await.unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(store.snapshot().draws[0].id(), "50000");
    }
}
