//! End-to-end sync flows: cache/seed bootstrap, proxy rotation,
//! multi-stage merge, persistence across restarts, and total failure.

use std::sync::Arc;

use dlt_tracker::config::{CsvSourceConfig, ScrapedSourceConfig};
use dlt_tracker::engine::{HistoryStore, StageResult, SyncOrchestrator, SyncOutcome};
use dlt_tracker::export::{parse_csv, to_csv};
use dlt_tracker::prize::summarise;
use dlt_tracker::sources::cache::CacheSource;
use dlt_tracker::sources::http::FetchError;
use dlt_tracker::sources::remote_csv::RemoteCsvSource;
use dlt_tracker::sources::scraped::ScrapedSource;
use dlt_tracker::types::{DrawRecord, Ticket, Tier};

use crate::mock_source::{history_page, FakeWeb, MockSource};

fn pipeline(dir: &tempfile::TempDir) -> (Arc<HistoryStore>, SyncOrchestrator) {
    let path = dir.path().join("dlt_history.json");
    let store = Arc::new(HistoryStore::new(&path));
    let orchestrator = SyncOrchestrator::new(store.clone(), CacheSource::new(&path));
    (store, orchestrator)
}

fn scraped_config() -> ScrapedSourceConfig {
    ScrapedSourceConfig {
        base_url: "https://datachart.example.com/dlt/history.php".to_string(),
        proxies: vec!["https://p1.example/?".to_string(), "https://p2.example/?".to_string()],
        limits: vec![100, 50],
        ..ScrapedSourceConfig::default()
    }
}

fn d(id: &str, date: &str, front: [u32; 5], back: [u32; 2]) -> DrawRecord {
    DrawRecord::new(id, date, &front, &back).unwrap()
}

#[tokio::test]
async fn test_fresh_start_scrapes_through_second_proxy_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let (store, orchestrator) = pipeline(&dir);

    let web = FakeWeb::default();
    web.fail("https://p1.example/", FetchError::Status(503));
    web.serve("https://p2.example/", history_page(24100, 10));
    let scraped = ScrapedSource::new(web.clone(), scraped_config()).unwrap();
    let orchestrator = orchestrator.with_source(Box::new(scraped));

    let report = orchestrator.sync().await;
    assert_eq!(report.outcome, SyncOutcome::Succeeded);
    assert_eq!(report.stages[0].result, StageResult::Seeded { draws: 5 });
    assert_eq!(
        report.stages[1].result,
        StageResult::Merged { fetched: 10, added: 10, updated: 0 }
    );

    // One attempt on the failing proxy, then the first limit on p2.
    let requested = web.requested();
    assert_eq!(requested.len(), 2);
    assert!(requested[1].starts_with("https://p2.example/?https%3A%2F%2Fdatachart.example.com"));
    assert!(requested[1].contains("limit%3D100"));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 15);
    assert_eq!(snapshot.draws[0].id(), "24100");
    assert_eq!(snapshot.draws.last().unwrap().id(), "24021");

    // Restart: a new store picks the history up from disk.
    let (restarted, orchestrator) = pipeline(&dir);
    let stage = orchestrator.bootstrap().await;
    assert_eq!(stage.result, StageResult::Loaded { draws: 15, version: snapshot.version });
    assert_eq!(restarted.snapshot().draws, snapshot.draws);
}

#[tokio::test]
async fn test_csv_and_scraped_stages_merge() {
    let dir = tempfile::tempdir().unwrap();
    let (store, orchestrator) = pipeline(&dir);

    let web = FakeWeb::default();
    web.serve(
        "https://data.example.com/dlt.csv",
        "id,date,f1,f2,f3,f4,f5,b1,b2\n\
         24026,2024-03-06,2,4,6,8,10,1,12\n\
         24025,2024-03-04,1,5,10,20,31,2,11\n",
    );
    let csv = RemoteCsvSource::new(
        web,
        &CsvSourceConfig { url: Some("https://data.example.com/dlt.csv".to_string()), timeout_secs: 5 },
    );
    let scraped = MockSource::new("scraped", vec![d("24027", "2024-03-09", [7, 8, 9, 10, 11], [5, 6])]);

    let orchestrator = orchestrator
        .with_source(Box::new(csv))
        .with_source(Box::new(scraped.clone()));

    let report = orchestrator.sync().await;
    assert_eq!(report.outcome, SyncOutcome::Succeeded);
    assert_eq!(report.stages[1].stage, "remote-csv");
    assert_eq!(
        report.stages[1].result,
        StageResult::Merged { fetched: 2, added: 1, updated: 1 }
    );
    assert_eq!(report.stages[2].stage, "scraped");
    assert_eq!(scraped.calls(), 1);

    let snapshot = store.snapshot();
    let ids: Vec<&str> = snapshot.draws.iter().map(|d| d.id()).collect();
    assert_eq!(ids, vec!["24027", "24026", "24025", "24024", "24023", "24022", "24021"]);
    // The CSV copy of 24025 replaced the seed copy.
    assert_eq!(snapshot.draws[2].front(), &[1, 5, 10, 20, 31]);
    assert_eq!(snapshot.version, 3);
}

#[tokio::test]
async fn test_total_failure_keeps_history_usable() {
    let dir = tempfile::tempdir().unwrap();
    let (store, orchestrator) = pipeline(&dir);

    let web = FakeWeb::default();
    web.serve("https://p1.example/", "<html>Access denied</html>");
    web.fail("https://p2.example/", FetchError::Transport("connection reset".into()));
    let scraped = ScrapedSource::new(web, scraped_config()).unwrap();
    let orchestrator = orchestrator.with_source(Box::new(scraped));

    let report = orchestrator.sync().await;
    assert_eq!(report.outcome, SyncOutcome::Failed);
    match &report.stages[1].result {
        StageResult::Failed { error } => assert!(error.contains("all 2 attempts failed"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }

    let status = orchestrator.status();
    assert!(!status.syncing);
    assert_eq!(status.last_report.unwrap().outcome, SyncOutcome::Failed);

    // The seed history still backs the backtest.
    let snapshot = store.snapshot();
    let ticket: Ticket = "1,5,10,20,30+2,11".parse().unwrap();
    let summary = summarise(&ticket, &snapshot.draws, snapshot.version);
    assert_eq!(summary.best_tier, Tier::new(1));
    assert!(!dir.path().join("dlt_history.json").exists());
}

#[tokio::test]
async fn test_resync_versions_only_move_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let (store, orchestrator) = pipeline(&dir);
    let source = MockSource::new("scraped", vec![d("24026", "2024-03-06", [2, 4, 6, 8, 10], [1, 12])]);
    let orchestrator = orchestrator.with_source(Box::new(source.clone()));
    let mut updates = store.subscribe();

    assert_eq!(orchestrator.sync().await.version, 2);
    assert!(updates.has_changed().unwrap());
    let _ = updates.borrow_and_update();

    // Same data again: merged, but nothing new to publish.
    let report = orchestrator.sync().await;
    assert_eq!(report.version, 2);
    assert_eq!(report.stages[1].result, StageResult::Merged { fetched: 1, added: 0, updated: 0 });
    assert!(!updates.has_changed().unwrap());

    source.set_draws(vec![d("24027", "2024-03-09", [7, 8, 9, 10, 11], [5, 6])]);
    assert_eq!(orchestrator.sync().await.version, 3);
    assert_eq!(store.snapshot().len(), 7);

    source.fail_with("upstream down");
    let report = orchestrator.sync().await;
    assert_eq!(report.outcome, SyncOutcome::Failed);
    assert_eq!(report.version, 3);
}

#[tokio::test]
async fn test_export_import_between_stores() {
    let dir_a = tempfile::tempdir().unwrap();
    let (store_a, orchestrator_a) = pipeline(&dir_a);
    orchestrator_a.bootstrap().await;
    orchestrator_a
        .import(&[d("24026", "2024-03-06", [2, 4, 6, 8, 10], [1, 12])])
        .await
        .unwrap();

    let csv = to_csv(&store_a.snapshot().draws).unwrap();
    let parsed = parse_csv(&csv);
    assert_eq!(parsed.skipped, 0);

    let dir_b = tempfile::tempdir().unwrap();
    let (store_b, orchestrator_b) = pipeline(&dir_b);
    orchestrator_b.import(&parsed.draws).await.unwrap();

    assert_eq!(store_b.snapshot().draws, store_a.snapshot().draws);
}
